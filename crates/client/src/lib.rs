//! Portier client
//!
//! HTTP access to the Portier user and credential services. The
//! [`AuthenticatedClient`] attaches the stored bearer token to every request
//! and, when the user service answers 401, renews the token pair with a
//! single shared refresh call before replaying the request.

pub mod client;
pub mod credentials;
pub mod env;
pub mod routing;
pub mod session;
pub mod types;

pub use client::error::{ClientError, RefreshError};
pub use client::navigation::{Navigator, ROOT_PATH};
pub use client::refresh::{REFRESH_PATH, RefreshState};
pub use client::typed::{AuthenticatedClient, PublicClient};
pub use client::{ClientProvider, ClientProviderBuilder, ClientSettings};
pub use credentials::{CookieJar, CookieOptions, CredentialEvent, CredentialManager, CredentialStore, MemoryStore, Snapshot};
pub use env::{EnvError, EnvResolver, EnvSource, EnvironmentConfig, ProcessEnv, StaticEnv};
pub use routing::ServiceRoute;
pub use session::{AuthSession, AuthState, User};
