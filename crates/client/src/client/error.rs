//! Client error types

use crate::env::EnvError;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The API base URLs could not be resolved
    #[error("Environment unavailable: {0}")]
    Environment(#[from] EnvError),

    /// The stored access token cannot be used as a header value
    #[error("Invalid access token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    /// The session could not be renewed; credentials were cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// The login endpoint rejected the credentials
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// A session-changing response carried no usable token pair
    #[error("Response did not contain a token pair")]
    MissingTokens,
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the caller's session is gone and a fresh login is required
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::RefreshFailed(_))
    }
}

/// Why a token refresh could not produce a usable credential pair.
///
/// Every waiter of a shared refresh observes the same value, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Transport-level failure talking to the credential service
    #[error("credential service unreachable: {0}")]
    Network(String),

    /// The credential service answered with a non-success status
    #[error("credential service rejected the refresh ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body was not the expected envelope
    #[error("refresh response could not be decoded: {0}")]
    Decode(String),

    /// The envelope lacked a token or refresh token
    #[error("refresh response did not contain a token pair")]
    MissingTokens,
}
