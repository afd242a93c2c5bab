//! Client configuration and initialization
//!
//! A [`ClientProvider`] is built once at process start and handed to every
//! consumer. It resolves the environment on first use and constructs at most
//! one [`AuthenticatedClient`] and one [`PublicClient`], however many callers
//! race for them.

pub mod company;
pub mod error;
pub mod navigation;
pub mod refresh;
pub mod typed;
pub mod user;

use crate::credentials::{CredentialManager, MemoryStore};
use crate::env::{EnvResolver, EnvSource, EnvironmentConfig};
use error::ClientError;
use navigation::Navigator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use typed::{AuthenticatedClient, PublicClient};

const DEFAULT_USER_AGENT: &str = concat!("portier-client/", env!("CARGO_PKG_VERSION"));

/// Transport settings shared by both clients
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Request timeout; `None` leaves the transport default in place
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Owner of the process-wide clients
pub struct ClientProvider {
    env: EnvResolver,
    credentials: CredentialManager,
    navigator: Option<Arc<dyn Navigator>>,
    settings: ClientSettings,
    authenticated: OnceCell<AuthenticatedClient>,
    public: OnceCell<PublicClient>,
}

impl ClientProvider {
    pub fn builder() -> ClientProviderBuilder {
        ClientProviderBuilder::default()
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Resolved base URLs
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Environment`] if the source cannot supply them.
    pub async fn environment(&self) -> Result<Arc<EnvironmentConfig>, ClientError> {
        Ok(self.env.resolve().await?)
    }

    /// Get the authenticated client, constructing it on first use
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Environment`] if the base URLs cannot be
    /// resolved or [`ClientError::Request`] if the transport cannot be built.
    pub async fn authenticated(&self) -> Result<AuthenticatedClient, ClientError> {
        self.authenticated
            .get_or_try_init(|| async {
                let env = self.environment().await?;
                info!(user_api = env.user_api(), "Constructing authenticated client");
                AuthenticatedClient::new(
                    &env,
                    &self.settings,
                    self.credentials.clone(),
                    self.navigator.clone(),
                )
            })
            .await
            .cloned()
    }

    /// Get the public client (for unauthenticated endpoints)
    ///
    /// # Errors
    ///
    /// Same as [`ClientProvider::authenticated`].
    pub async fn public(&self) -> Result<PublicClient, ClientError> {
        self.public
            .get_or_try_init(|| async {
                let env = self.environment().await?;
                info!(user_api = env.user_api(), "Constructing public client");
                PublicClient::new(&env, &self.settings)
            })
            .await
            .cloned()
    }
}

/// Builder for [`ClientProvider`]
#[derive(Default)]
pub struct ClientProviderBuilder {
    env: Option<Arc<dyn EnvSource>>,
    credentials: Option<CredentialManager>,
    navigator: Option<Arc<dyn Navigator>>,
    settings: ClientSettings,
}

impl ClientProviderBuilder {
    /// Set where the base URLs come from
    #[must_use]
    pub fn env_source(mut self, source: Arc<dyn EnvSource>) -> Self {
        self.env = Some(source);
        self
    }

    /// Share an existing credential manager; defaults to an in-memory store
    #[must_use]
    pub fn credentials(mut self, credentials: CredentialManager) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Hook invoked with the root path when a refresh fails
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.settings.user_agent = agent.into();
        self
    }

    /// Build the provider
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if no environment source was set.
    pub fn build(self) -> Result<ClientProvider, ClientError> {
        let env = self
            .env
            .ok_or_else(|| ClientError::Configuration("env source is required".into()))?;

        Ok(ClientProvider {
            env: EnvResolver::new(env),
            credentials: self
                .credentials
                .unwrap_or_else(|| CredentialManager::new(Arc::new(MemoryStore::new()))),
            navigator: self.navigator,
            settings: self.settings,
            authenticated: OnceCell::new(),
            public: OnceCell::new(),
        })
    }
}
