//! Shared fixtures for the client integration tests

#![allow(dead_code)]

use portier_client::{
    ClientProvider, CredentialManager, CredentialStore, EnvironmentConfig, MemoryStore, StaticEnv,
    types::TokenPair,
};
use std::sync::{Arc, Mutex};
use wiremock::{Match, Request};

/// Matches requests that carry no `Authorization` header
pub struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

pub struct Harness {
    pub provider: Arc<ClientProvider>,
    pub credentials: CredentialManager,
    pub navigations: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

pub fn pair(token: &str, refresh: &str) -> TokenPair {
    TokenPair {
        token: token.to_string(),
        refresh_token: refresh.to_string(),
    }
}

/// Provider whose user and credential services both live at the given URLs
pub fn harness_with(user_api: &str, credential_api: &str) -> Harness {
    harness_with_store(user_api, credential_api, Arc::new(MemoryStore::new()))
}

/// Same as [`harness_with`], over a caller-supplied store
pub fn harness_with_store(
    user_api: &str,
    credential_api: &str,
    store: Arc<dyn CredentialStore>,
) -> Harness {
    let credentials = CredentialManager::new(store);
    let navigations = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let navigations = Arc::clone(&navigations);
        move |path: &str| navigations.lock().unwrap().push(path.to_string())
    };

    let env = EnvironmentConfig::new(user_api, credential_api).unwrap();
    let provider = ClientProvider::builder()
        .env_source(Arc::new(StaticEnv::new(env)))
        .credentials(credentials.clone())
        .navigator(Arc::new(recorder))
        .build()
        .unwrap();

    Harness {
        provider: Arc::new(provider),
        credentials,
        navigations,
    }
}

pub fn harness(uri: &str) -> Harness {
    harness_with(uri, uri)
}
