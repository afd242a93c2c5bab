//! Token refresh state machine
//!
//! A 401 from the user service moves the coordinator from `Idle` to
//! `Refreshing`. Exactly one refresh call is in flight at a time: every
//! request that is rejected while it runs joins the same shared future and
//! retries with the pair it produces. A failed refresh clears the stored
//! credentials, sends the host back to the root path and leaves the
//! coordinator in `Failed` until the next refresh attempt.

use super::error::RefreshError;
use super::navigation::{Navigator, ROOT_PATH};
use crate::credentials::CredentialManager;
use crate::types::{GrantEnvelope, RefreshRequest, TokenPair};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

/// Path of the refresh endpoint on the credential service
pub const REFRESH_PATH: &str = "/api/v1/credential/refresh";

/// Observable phase of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed,
}

/// What a rejected request should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renewal {
    /// Replay the request with this access token
    Retry(String),
    /// Nothing to exchange; hand the 401 back to the caller
    Unavailable,
}

type PendingRefresh = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

enum Phase {
    Idle,
    Refreshing(PendingRefresh),
    Failed,
}

/// True if `url` targets the refresh endpoint; those 401s never trigger a refresh
pub fn is_refresh_endpoint(url: &Url) -> bool {
    url.path().trim_end_matches('/').ends_with(REFRESH_PATH)
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    endpoint: String,
    credentials: CredentialManager,
    navigator: Option<Arc<dyn Navigator>>,
    phase: Mutex<Phase>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        credential_api: &str,
        credentials: CredentialManager,
        navigator: Option<Arc<dyn Navigator>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                endpoint: format!("{}{REFRESH_PATH}", credential_api.trim_end_matches('/')),
                credentials,
                navigator,
                phase: Mutex::new(Phase::Idle),
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        match &*self.inner.lock_phase() {
            Phase::Idle => RefreshState::Idle,
            Phase::Refreshing(_) => RefreshState::Refreshing,
            Phase::Failed => RefreshState::Failed,
        }
    }

    /// Obtain a replacement for the access token `rejected` that just got a 401.
    ///
    /// A 401 with neither token stored is handed back unchanged. An access
    /// token without a refresh token to exchange ends the session.
    ///
    /// # Errors
    ///
    /// Returns the [`RefreshError`] of the shared refresh call, or
    /// [`RefreshError::MissingTokens`] when no refresh token is stored. By
    /// then the credentials have been cleared and the host navigated to the
    /// root.
    pub async fn renew(&self, rejected: Option<&str>) -> Result<Renewal, RefreshError> {
        let pending = {
            let mut phase = self.inner.lock_phase();
            if let Phase::Refreshing(pending) = &*phase {
                debug!("Joining in-flight token refresh");
                pending.clone()
            } else {
                let snapshot = self.inner.credentials.snapshot();

                if let Some(current) = snapshot.access_token.as_deref()
                    && Some(current) != rejected
                {
                    debug!("Access token already rotated, retrying with stored token");
                    return Ok(Renewal::Retry(current.to_string()));
                }

                let Some(refresh_token) = snapshot.refresh_token else {
                    if snapshot.access_token.is_none() {
                        debug!("No credentials stored, passing 401 through");
                        return Ok(Renewal::Unavailable);
                    }
                    *phase = Phase::Failed;
                    drop(phase);
                    let error = RefreshError::MissingTokens;
                    warn!(error = %error, "Access token rejected with no refresh token, ending session");
                    self.inner.end_session(snapshot.generation);
                    return Err(error);
                };

                let inner = Arc::clone(&self.inner);
                let generation = snapshot.generation;
                let access_token = snapshot.access_token;
                let pending =
                    async move { inner.run(generation, access_token, refresh_token).await }
                        .boxed()
                        .shared();
                *phase = Phase::Refreshing(pending.clone());
                pending
            }
        };

        let pair = pending.await?;
        // A login that landed mid-refresh outranks the refreshed pair
        let token = self.inner.credentials.access_token().unwrap_or(pair.token);
        Ok(Renewal::Retry(token))
    }
}

impl Inner {
    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the pair read at `generation` and send the host to the root
    fn end_session(&self, generation: u64) {
        if self.credentials.clear_if_current(generation)
            && let Some(navigator) = &self.navigator
        {
            navigator.navigate(ROOT_PATH);
        }
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        access_token: Option<String>,
        refresh_token: String,
    ) -> Result<TokenPair, RefreshError> {
        info!("Access token rejected, refreshing credentials");

        match self.request_pair(access_token.as_deref(), refresh_token).await {
            Ok(pair) => {
                if !self.credentials.rotate_if_current(generation, &pair) {
                    debug!("Credentials replaced during refresh, keeping the newer pair");
                }
                *self.lock_phase() = Phase::Idle;
                info!("Credentials refreshed");
                Ok(pair)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                *self.lock_phase() = Phase::Failed;
                self.end_session(generation);
                Err(e)
            }
        }
    }

    async fn request_pair(
        &self,
        access_token: Option<&str>,
        refresh_token: String,
    ) -> Result<TokenPair, RefreshError> {
        let mut request = self
            .http
            .patch(&self.endpoint)
            .json(&RefreshRequest { refresh_token });
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: GrantEnvelope = response
            .json()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))?;
        envelope.into_pair().ok_or(RefreshError::MissingTokens)
    }
}
