//! Integration tests for the bearer/refresh pipeline

mod common;

use common::{NoAuthorization, harness, harness_with, harness_with_store, pair};
use portier_client::credentials::TOKEN_KEY;
use portier_client::{
    ClientError, CookieOptions, CredentialStore, MemoryStore, REFRESH_PATH, ROOT_PATH,
    RefreshError, RefreshState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn profile_body(company: &str) -> Value {
    json!({
        "data": {
            "uuid": "user-1",
            "displayName": "Somchai",
            "company": company,
            "email": "somchai@example.com"
        }
    })
}

fn grant(token: &str, refresh: &str) -> Value {
    json!({ "data": { "token": token, "refreshToken": refresh } })
}

async fn mount_expired_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_replayed() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", "Bearer T1"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("company-1")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));

    let client = h.provider.authenticated().await.unwrap();
    let profile = client.profile().await.unwrap();

    assert_eq!(profile.uuid.as_deref(), Some("user-1"));
    assert_eq!(h.credentials.pair(), Some(pair("T2", "R2")));
    assert_eq!(client.refresh_state(), RefreshState::Idle);
    assert!(h.navigations().is_empty());
}

#[tokio::test]
async fn test_later_requests_use_rotated_token() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("company-1")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/permissions/user"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "name": "Ticket" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));

    let client = h.provider.authenticated().await.unwrap();
    client.profile().await.unwrap();
    let permissions = client.permissions().await.unwrap();

    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].name, "Ticket");
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(grant("T2", "R2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("company-1")))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let (a, b, c) = tokio::join!(client.profile(), client.profile(), client.profile());

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(h.credentials.pair(), Some(pair("T2", "R2")));
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_rejected_refresh_clears_credentials_and_navigates_home() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh token revoked")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let (a, b) = tokio::join!(client.profile(), client.profile());

    for result in [a, b] {
        match result {
            Err(ClientError::RefreshFailed(RefreshError::Rejected { status, message })) => {
                assert_eq!(status, 401);
                assert_eq!(message, "refresh token revoked");
            }
            other => panic!("expected refresh failure, got {other:?}"),
        }
    }

    assert_eq!(h.credentials.access_token(), None);
    assert_eq!(h.credentials.refresh_token(), None);
    assert_eq!(h.navigations(), vec![ROOT_PATH.to_string()]);
    assert_eq!(client.refresh_state(), RefreshState::Failed);
}

#[tokio::test]
async fn test_refresh_without_token_pair_is_terminal() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "token": "T2" } })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let err = client.profile().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RefreshFailed(RefreshError::MissingTokens)
    ));
    assert!(err.is_session_expired());
    assert_eq!(h.credentials.pair(), None);
    assert_eq!(h.navigations().len(), 1);
}

#[tokio::test]
async fn test_unreachable_credential_service_is_terminal() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    // Nothing listens on port 1
    let h = harness_with(&server.uri(), "http://127.0.0.1:1");
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let err = client.profile().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RefreshFailed(RefreshError::Network(_))
    ));
    assert_eq!(h.credentials.pair(), None);
    assert_eq!(h.navigations(), vec!["/".to_string()]);
}

#[tokio::test]
async fn test_401_on_refresh_endpoint_is_not_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let request = client
        .request(reqwest::Method::PATCH, REFRESH_PATH)
        .json(&json!({ "refreshToken": "R1" }));
    let result = client.execute::<Value>(request).await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert_eq!(h.credentials.pair(), Some(pair("T1", "R1")));
    assert!(h.navigations().is_empty());
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_non_401_errors_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/company"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let err = client.companies().await.unwrap_err();
    assert!(matches!(err, ClientError::ServerError { status: 500, .. }));
    assert_eq!(h.credentials.pair(), Some(pair("T1", "R1")));
}

#[tokio::test]
async fn test_no_credentials_sends_no_authorization_and_skips_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let client = h.provider.authenticated().await.unwrap();

    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert!(h.navigations().is_empty());
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_access_token_without_refresh_token_ends_session() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "T1", &CookieOptions::default());

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness_with_store(&server.uri(), &server.uri(), store);
    let client = h.provider.authenticated().await.unwrap();

    let err = client.profile().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RefreshFailed(RefreshError::MissingTokens)
    ));
    assert_eq!(h.credentials.access_token(), None);
    assert_eq!(h.navigations(), vec![ROOT_PATH.to_string()]);
    assert_eq!(client.refresh_state(), RefreshState::Failed);

    // Nothing left to send; later 401s come back untouched
    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert_eq!(h.navigations().len(), 1);
}

#[tokio::test]
async fn test_late_401_reuses_completed_refresh() {
    let server = MockServer::start().await;

    // The profile call is rejected only after the refresh has finished
    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("token expired")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/permissions/user"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/permissions/user"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "name": "Admin" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("company-1")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let (profile, permissions) = tokio::join!(client.profile(), client.permissions());

    assert_eq!(profile.unwrap().uuid.as_deref(), Some("user-1"));
    assert_eq!(permissions.unwrap()[0].name, "Admin");
    assert_eq!(h.credentials.pair(), Some(pair("T2", "R2")));
    assert_eq!(client.refresh_state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_replayed_401_is_returned_without_second_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still expired"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert_eq!(h.credentials.pair(), Some(pair("T2", "R2")));
}

#[tokio::test]
async fn test_session_recovers_after_failed_refresh() {
    let server = MockServer::start().await;
    mount_expired_profile(&server).await;

    Mock::given(method("PATCH"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .and(header("authorization", "Bearer FRESH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("company-1")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.credentials.store(&pair("T1", "R1"));
    let client = h.provider.authenticated().await.unwrap();

    assert!(client.profile().await.is_err());
    assert_eq!(client.refresh_state(), RefreshState::Failed);

    // A new login writes a fresh pair
    h.credentials.store(&pair("FRESH", "FRESH-R"));
    let profile = client.profile().await.unwrap();
    assert_eq!(profile.company.as_deref(), Some("company-1"));
}
