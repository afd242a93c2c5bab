//! Credential persistence

mod manager;
mod store;

pub use manager::{CredentialEvent, CredentialManager, REFRESH_TOKEN_KEY, Snapshot, TOKEN_KEY};
pub use store::{CookieJar, CookieOptions, CredentialStore, MemoryStore};
