//! User service endpoints

use super::error::ClientError;
use super::typed::{AuthenticatedClient, PublicClient};
use crate::types::{Envelope, LoginRequest, LoginResponse, ServicePermission, TokenPair, UserProfile};
use reqwest::{Method, StatusCode};

pub const LOGIN_PATH: &str = "/api/v1/users/login";
pub const PROFILE_PATH: &str = "/api/v1/users/profile";
pub const PERMISSIONS_PATH: &str = "/api/v1/permissions/user";

/// A successful email/password login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub profile: UserProfile,
    pub message: Option<String>,
}

/// Best human-readable message in an error body
fn server_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.to_string())
}

impl PublicClient {
    /// Exchange email and password for a token pair.
    ///
    /// Nothing is written to the credential store here; the caller decides.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::LoginFailed`] carrying the server message on any
    /// status other than 200, or when the response is unreadable or lacks a
    /// token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        let request = self.request(Method::POST, LOGIN_PATH).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        let response = self.send(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(ClientError::LoginFailed(server_message(status, &body)));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::LoginFailed(format!("unreadable response: {e}")))?;
        let tokens = parsed
            .data
            .and_then(|grant| grant.into_pair())
            .ok_or_else(|| ClientError::LoginFailed("response did not contain a token pair".into()))?;

        Ok(LoginOutcome {
            tokens,
            profile: parsed.profile.unwrap_or_default(),
            message: parsed.message,
        })
    }
}

impl AuthenticatedClient {
    /// Profile of the signed-in user
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let request = self.request(Method::GET, PROFILE_PATH);
        let envelope: Envelope<UserProfile> = self.execute(request).await?;
        Ok(envelope.data)
    }

    /// Services the user may open in the current company
    pub async fn permissions(&self) -> Result<Vec<ServicePermission>, ClientError> {
        let request = self.request(Method::GET, PERMISSIONS_PATH);
        let envelope: Envelope<Vec<ServicePermission>> = self.execute(request).await?;
        Ok(envelope.data)
    }
}
