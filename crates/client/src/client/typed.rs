//! Public and authenticated clients bound to the user service

use super::ClientSettings;
use super::error::ClientError;
use super::navigation::Navigator;
use super::refresh::{RefreshCoordinator, RefreshState, Renewal, is_refresh_endpoint};
use crate::credentials::CredentialManager;
use crate::env::EnvironmentConfig;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, ClientBuilder, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

fn build_http(settings: &ClientSettings) -> Result<Client, ClientError> {
    let mut builder = ClientBuilder::new().user_agent(settings.user_agent.as_str());
    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Turn a response into `T`, classifying non-success statuses
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();

    if status.is_success() {
        Ok(response.json().await?)
    } else {
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        Err(ClientError::from_status(status, message))
    }
}

/// Set or strip the bearer header on an outbound request
fn set_bearer(request: &mut Request, token: Option<&str>) -> Result<(), ClientError> {
    match token {
        Some(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            request.headers_mut().remove(AUTHORIZATION);
        }
    }
    Ok(())
}

/// Client for endpoints that precede having any credential
#[derive(Clone)]
pub struct PublicClient {
    inner: Arc<PublicInner>,
}

struct PublicInner {
    client: Client,
    base_url: String,
}

impl PublicClient {
    pub(crate) fn new(env: &EnvironmentConfig, settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            inner: Arc::new(PublicInner {
                client: build_http(settings)?,
                base_url: env.user_api().to_string(),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Create a request builder without authentication
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        self.inner.client.request(method, url)
    }

    /// Send a request, returning the raw response whatever its status
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] if the request cannot be built or sent.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        let mut request = request.build()?;
        request.headers_mut().remove(AUTHORIZATION);
        Ok(self.inner.client.execute(request).await?)
    }

    /// Execute a request and handle common errors
    ///
    /// # Errors
    ///
    /// Returns a transport error or the classified status error.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        decode(self.send(request).await?).await
    }

    /// Whether both handles point at the same client
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Client that attaches the stored bearer token and renews it on 401
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<AuthenticatedInner>,
}

struct AuthenticatedInner {
    client: Client,
    base_url: String,
    credentials: CredentialManager,
    refresh: RefreshCoordinator,
}

impl AuthenticatedClient {
    pub(crate) fn new(
        env: &EnvironmentConfig,
        settings: &ClientSettings,
        credentials: CredentialManager,
        navigator: Option<Arc<dyn Navigator>>,
    ) -> Result<Self, ClientError> {
        let client = build_http(settings)?;
        let refresh = RefreshCoordinator::new(
            client.clone(),
            env.credential_api(),
            credentials.clone(),
            navigator,
        );

        Ok(Self {
            inner: Arc::new(AuthenticatedInner {
                client,
                base_url: env.user_api().to_string(),
                credentials,
                refresh,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.inner.refresh.state()
    }

    /// Create a request builder against the user service
    ///
    /// The bearer header is attached when the request is sent, so a token
    /// rotated in between is picked up.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        self.inner.client.request(method, url)
    }

    /// Send a request through the bearer/refresh pipeline.
    ///
    /// A 401 triggers (or joins) a token refresh and the request is replayed
    /// once with the new token; the replay's response is returned as-is.
    /// Requests with streaming bodies cannot be replayed and get their 401
    /// back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] on build or transport failure and
    /// [`ClientError::RefreshFailed`] when the session could not be renewed.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        let mut request = request.build()?;
        let token = self.inner.credentials.access_token();
        set_bearer(&mut request, token.as_deref())?;

        let refresh_call = is_refresh_endpoint(request.url());
        let replay = request.try_clone();
        let response = self.inner.client.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || refresh_call {
            return Ok(response);
        }

        let Some(mut replay) = replay else {
            debug!(url = %response.url(), "Request body is not replayable, returning 401");
            return Ok(response);
        };

        match self.inner.refresh.renew(token.as_deref()).await? {
            Renewal::Unavailable => Ok(response),
            Renewal::Retry(token) => {
                set_bearer(&mut replay, Some(&token))?;
                debug!(url = %replay.url(), "Replaying request with refreshed token");
                Ok(self.inner.client.execute(replay).await?)
            }
        }
    }

    /// Execute a request and handle common errors
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedClient::send`]; non-success statuses after any
    /// replay are classified with [`ClientError::from_status`].
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        decode(self.send(request).await?).await
    }

    /// Whether both handles point at the same client
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
