//! Owner of the stored credential pair
//!
//! Every credential write in the crate goes through [`CredentialManager`].
//! Each write bumps a generation counter so that a slow writer (a token
//! refresh started before the user logged in again) can detect it has been
//! overtaken and leave the newer pair alone.

use super::store::{CookieOptions, CredentialStore};
use crate::types::TokenPair;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Key holding the access token
pub const TOKEN_KEY: &str = "token";

/// Key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

const EVENT_CAPACITY: usize = 16;

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A pair was written after login or company creation
    Stored,
    /// The pair was replaced by a refresh or a company switch
    Rotated,
    /// Both values were removed
    Cleared,
}

/// Credential values together with the generation they were read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub generation: u64,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    options: CookieOptions,
    generation: Mutex<u64>,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_options(store, CookieOptions::default())
    }

    /// Use explicit cookie attributes for every write
    pub fn with_options(store: Arc<dyn CredentialStore>, options: CookieOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                generation: Mutex::new(0),
                events,
            }),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.store.get(TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.store.get(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, if both are present
    pub fn pair(&self) -> Option<TokenPair> {
        Some(TokenPair {
            token: self.access_token()?,
            refresh_token: self.refresh_token()?,
        })
    }

    /// Generation and both tokens, read under one lock
    pub fn snapshot(&self) -> Snapshot {
        let generation = self.lock_generation();
        Snapshot {
            generation: *generation,
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        }
    }

    /// Write a fresh pair
    pub fn store(&self, pair: &TokenPair) {
        let mut generation = self.lock_generation();
        self.write(&mut generation, pair, CredentialEvent::Stored);
    }

    /// Replace the pair with one derived from the current session
    pub fn rotate(&self, pair: &TokenPair) {
        let mut generation = self.lock_generation();
        self.write(&mut generation, pair, CredentialEvent::Rotated);
    }

    /// Remove both tokens
    pub fn clear(&self) {
        let mut generation = self.lock_generation();
        self.erase(&mut generation);
    }

    /// Rotate only if nothing was written since `expected` was observed
    pub fn rotate_if_current(&self, expected: u64, pair: &TokenPair) -> bool {
        let mut generation = self.lock_generation();
        if *generation != expected {
            debug!(expected, current = *generation, "Skipping stale credential rotation");
            return false;
        }
        self.write(&mut generation, pair, CredentialEvent::Rotated);
        true
    }

    /// Clear only if nothing was written since `expected` was observed
    pub fn clear_if_current(&self, expected: u64) -> bool {
        let mut generation = self.lock_generation();
        if *generation != expected {
            debug!(expected, current = *generation, "Skipping stale credential clear");
            return false;
        }
        self.erase(&mut generation);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.inner.events.subscribe()
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, generation: &mut u64, pair: &TokenPair, event: CredentialEvent) {
        let store = &self.inner.store;
        store.set(TOKEN_KEY, &pair.token, &self.inner.options);
        store.set(REFRESH_TOKEN_KEY, &pair.refresh_token, &self.inner.options);
        *generation += 1;
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn erase(&self, generation: &mut u64) {
        self.inner.store.remove(TOKEN_KEY);
        self.inner.store.remove(REFRESH_TOKEN_KEY);
        *generation += 1;
        let _ = self.inner.events.send(CredentialEvent::Cleared);
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("has_token", &self.access_token().is_some())
            .finish_non_exhaustive()
    }
}
