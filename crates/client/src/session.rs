//! Signed-in user state
//!
//! [`AuthSession`] keeps the view-facing auth state in a watch channel and
//! performs the flows that change it. Token writes still go through the
//! provider's [`CredentialManager`](crate::credentials::CredentialManager).

use crate::client::ClientProvider;
use crate::client::error::ClientError;
use crate::credentials::CredentialEvent;
use crate::types::{NewCompany, UserProfile};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub uuid: Option<String>,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
}

impl From<UserProfile> for User {
    fn from(profile: UserProfile) -> Self {
        Self {
            uuid: profile.uuid,
            display_name: profile
                .display_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            picture_url: profile.picture_url,
            company: profile.company,
            email: profile.email,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct AuthSession {
    provider: Arc<ClientProvider>,
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    pub fn new(provider: Arc<ClientProvider>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self { provider, state }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Log in with email and password, storing the issued token pair
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::LoginFailed`] when the server rejects the
    /// credentials; no tokens are written in that case.
    pub async fn login_with_email(&self, email: &str, password: &str) -> Result<User, ClientError> {
        self.begin();

        let outcome = match self.provider.public().await {
            Ok(client) => client.login(email, password).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => {
                self.provider.credentials().store(&outcome.tokens);
                let user = User::from(outcome.profile);
                info!(email, "Logged in");
                self.authenticate(user.clone());
                Ok(user)
            }
            Err(e) => {
                let message = match &e {
                    ClientError::LoginFailed(_) => e.to_string(),
                    other => format!("Login failed: {other}"),
                };
                warn!(error = %message, "Login rejected");
                self.fail(message);
                Err(e)
            }
        }
    }

    /// Rebuild the user from a stored token, if there is one
    ///
    /// # Errors
    ///
    /// Returns any error of the profile call; the state is left signed out.
    pub async fn restore(&self) -> Result<Option<User>, ClientError> {
        if self.provider.credentials().access_token().is_none() {
            debug!("No stored token, staying signed out");
            return Ok(None);
        }

        self.begin();
        match self.reload_profile().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Switch to another company and reload the profile scoped to it
    ///
    /// # Errors
    ///
    /// Returns the error of the switch or the profile call.
    pub async fn switch_company(&self, uuid: &str) -> Result<User, ClientError> {
        let client = self.provider.authenticated().await?;
        client.switch_company(uuid).await?;
        self.reload_profile().await
    }

    /// Create a company, adopt its token pair and reload the profile
    ///
    /// # Errors
    ///
    /// Returns the error of the create or the profile call.
    pub async fn create_company(&self, company: &NewCompany) -> Result<User, ClientError> {
        let client = self.provider.authenticated().await?;
        client.create_company(company).await?;
        self.reload_profile().await
    }

    pub fn logout(&self) {
        self.provider.credentials().clear();
        self.state.send_replace(AuthState::default());
        info!("Logged out");
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|state| state.error = None);
    }

    /// React to a credential change made elsewhere
    pub fn observe(&self, event: &CredentialEvent) {
        if *event == CredentialEvent::Cleared && self.state.borrow().is_authenticated {
            debug!("Credentials cleared, resetting session");
            self.state.send_replace(AuthState::default());
        }
    }

    /// Apply credential events until the channel closes
    pub async fn follow(&self, mut events: broadcast::Receiver<CredentialEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.observe(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Credential events lagged");
                    if self.provider.credentials().access_token().is_none() {
                        self.observe(&CredentialEvent::Cleared);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn reload_profile(&self) -> Result<User, ClientError> {
        let client = self.provider.authenticated().await?;
        let user = User::from(client.profile().await?);
        self.authenticate(user.clone());
        Ok(user)
    }

    fn begin(&self) {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
    }

    fn authenticate(&self, user: User) {
        self.state.send_modify(|state| {
            state.user = Some(user);
            state.is_authenticated = true;
            state.is_loading = false;
            state.error = None;
        });
    }

    fn fail(&self, message: String) {
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.error = Some(message);
        });
    }
}
