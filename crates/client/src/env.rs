//! API base URL resolution
//!
//! The clients need two base URLs: the user service (all business endpoints)
//! and the credential service (token refresh). They are loaded once per
//! process through an [`EnvSource`]; concurrent callers that arrive while the
//! first load is still running share that load and its result.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Environment variable prefix read by [`ProcessEnv`]
pub const ENV_PREFIX: &str = "PORTIER";

/// Variable holding the user service base URL
pub const USER_API_VAR: &str = "PORTIER_USER_API";

/// Variable holding the credential service base URL
pub const CREDENTIAL_API_VAR: &str = "PORTIER_CREDENTIAL_API";

/// Errors raised while resolving the environment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("required variable {0} is not set")]
    Missing(&'static str),

    #[error("variable {var} is not a valid base URL: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("configuration source failed: {0}")]
    Source(String),
}

/// Resolved base URLs, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    user_api: String,
    credential_api: String,
}

impl EnvironmentConfig {
    /// Validate and normalize both base URLs
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] if either value is not an absolute
    /// `http`/`https` URL.
    pub fn new(
        user_api: impl AsRef<str>,
        credential_api: impl AsRef<str>,
    ) -> Result<Self, EnvError> {
        Ok(Self {
            user_api: normalize_base_url(USER_API_VAR, user_api.as_ref())?,
            credential_api: normalize_base_url(CREDENTIAL_API_VAR, credential_api.as_ref())?,
        })
    }

    /// Base URL of the user service
    pub fn user_api(&self) -> &str {
        &self.user_api
    }

    /// Base URL of the credential service
    pub fn credential_api(&self) -> &str {
        &self.credential_api
    }
}

fn normalize_base_url(var: &'static str, raw: &str) -> Result<String, EnvError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvError::Missing(var));
    }

    let url = Url::parse(trimmed).map_err(|e| EnvError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(EnvError::Invalid {
            var,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Where the base URLs come from
#[async_trait]
pub trait EnvSource: Send + Sync {
    /// Load the environment once
    async fn load(&self) -> Result<EnvironmentConfig, EnvError>;
}

/// Fixed base URLs, used by tests and explicit command-line overrides
#[derive(Debug, Clone)]
pub struct StaticEnv(EnvironmentConfig);

impl StaticEnv {
    pub const fn new(config: EnvironmentConfig) -> Self {
        Self(config)
    }
}

#[async_trait]
impl EnvSource for StaticEnv {
    async fn load(&self) -> Result<EnvironmentConfig, EnvError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    user_api: Option<String>,
    credential_api: Option<String>,
}

/// Layered configuration: an optional file, then `PORTIER_*` variables
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    file: Option<PathBuf>,
    vars: Option<HashMap<String, String>>,
}

impl ProcessEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `user_api` / `credential_api` from a TOML or YAML file first
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the process environment with an explicit variable map
    #[must_use]
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }

    fn read(&self) -> Result<EnvironmentConfig, EnvError> {
        let mut builder = config::Config::builder();
        if let Some(file) = &self.file {
            builder = builder.add_source(config::File::from(file.as_path()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).source(self.vars.clone()),
        );

        let raw: RawEnv = builder
            .build()
            .and_then(|settings| settings.try_deserialize::<RawEnv>())
            .map_err(|e| EnvError::Source(e.to_string()))?;

        let user_api = raw.user_api.ok_or(EnvError::Missing(USER_API_VAR))?;
        let credential_api = raw
            .credential_api
            .ok_or(EnvError::Missing(CREDENTIAL_API_VAR))?;
        EnvironmentConfig::new(user_api, credential_api)
    }
}

#[async_trait]
impl EnvSource for ProcessEnv {
    async fn load(&self) -> Result<EnvironmentConfig, EnvError> {
        self.read()
    }
}

type PendingEnv = Shared<BoxFuture<'static, Result<Arc<EnvironmentConfig>, EnvError>>>;

enum Resolution {
    Unresolved,
    Pending(PendingEnv),
    Resolved(Arc<EnvironmentConfig>),
}

/// Memoizing, single-flight front for an [`EnvSource`]
pub struct EnvResolver {
    source: Arc<dyn EnvSource>,
    state: Mutex<Resolution>,
}

impl EnvResolver {
    pub fn new(source: Arc<dyn EnvSource>) -> Self {
        Self {
            source,
            state: Mutex::new(Resolution::Unresolved),
        }
    }

    /// Resolve the environment, loading it at most once per success.
    ///
    /// A failed load is handed to every caller that joined it and then
    /// forgotten, so the next call starts a fresh load.
    ///
    /// # Errors
    ///
    /// Returns the [`EnvError`] produced by the source.
    pub async fn resolve(&self) -> Result<Arc<EnvironmentConfig>, EnvError> {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                Resolution::Resolved(env) => return Ok(Arc::clone(env)),
                Resolution::Pending(pending) => {
                    debug!("Joining in-flight environment resolution");
                    pending.clone()
                }
                Resolution::Unresolved => {
                    let source = Arc::clone(&self.source);
                    let pending = async move { source.load().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    *state = Resolution::Pending(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Resolution::Pending(current) = &*state
            && current.ptr_eq(&pending)
        {
            *state = match &result {
                Ok(env) => Resolution::Resolved(Arc::clone(env)),
                Err(e) => {
                    warn!(error = %e, "Environment resolution failed");
                    Resolution::Unresolved
                }
            };
        }

        result
    }
}
