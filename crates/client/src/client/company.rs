//! Company (tenant) endpoints
//!
//! Creating or switching a company re-scopes the session, so the server
//! answers with a fresh token pair that replaces the stored one.

use super::error::ClientError;
use super::typed::AuthenticatedClient;
use crate::types::{Company, Envelope, GrantEnvelope, NewCompany, TokenPair};
use reqwest::Method;
use tracing::info;

pub const COMPANY_PATH: &str = "/api/v1/company";
pub const SWITCH_COMPANY_PATH: &str = "/api/v1/company/switch-company";

fn validate_company_id(uuid: &str) -> Result<(), ClientError> {
    if uuid.is_empty() || !uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ClientError::BadRequest(format!("invalid company id `{uuid}`")));
    }
    Ok(())
}

impl AuthenticatedClient {
    /// Companies the user belongs to
    pub async fn companies(&self) -> Result<Vec<Company>, ClientError> {
        let request = self.request(Method::GET, COMPANY_PATH);
        let envelope: Envelope<Vec<Company>> = self.execute(request).await?;
        Ok(envelope.data)
    }

    /// Create a company and adopt the token pair scoped to it
    pub async fn create_company(&self, company: &NewCompany) -> Result<TokenPair, ClientError> {
        let request = self.request(Method::POST, COMPANY_PATH).json(company);
        let pair = self.rotate_from(request).await?;
        info!(name = %company.name, "Company created");
        Ok(pair)
    }

    /// Re-scope the session to another company
    pub async fn switch_company(&self, uuid: &str) -> Result<TokenPair, ClientError> {
        validate_company_id(uuid)?;
        let request = self.request(Method::PATCH, &format!("{SWITCH_COMPANY_PATH}/{uuid}"));
        let pair = self.rotate_from(request).await?;
        info!(company = uuid, "Switched company");
        Ok(pair)
    }

    async fn rotate_from(&self, request: reqwest::RequestBuilder) -> Result<TokenPair, ClientError> {
        let envelope: GrantEnvelope = self.execute(request).await?;
        let pair = envelope.into_pair().ok_or(ClientError::MissingTokens)?;
        self.credentials().rotate(&pair);
        Ok(pair)
    }
}
