//! Shared helpers for the integration tests
//!
//! Provides wiremock-based mock servers and fabricated OAuth tokens. Every
//! client built here is rooted directly at the mock server, with no API
//! version prefix.

use std::sync::Arc;

use chrono::Utc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bracelet_api::client::ApiClient;
use bracelet_api::session::SessionManager;
use bracelet_core::config::OauthConfig;
use bracelet_core::domain::{OauthToken, TokenClaims};
use bracelet_core::ports::MemoryTokenStorage;

/// Starts a mock server and returns it with a client rooted at it.
pub async fn setup_api_mock() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let api = ApiClient::with_base_url(server.uri());
    (server, api)
}

/// Unsigned access token for `user_id` expiring `expires_in_secs` from now.
pub fn access_token(user_id: i64, expires_in_secs: i64) -> String {
    TokenClaims {
        user_id: Some(user_id),
        role: Some("doctor".into()),
        exp: Some(Utc::now().timestamp() + expires_in_secs),
    }
    .encode_unsigned()
}

pub fn token(user_id: i64, expires_in_secs: i64, refresh: Option<&str>) -> OauthToken {
    OauthToken::new(
        access_token(user_id, expires_in_secs),
        refresh.map(str::to_string),
        Some("bearer".into()),
        Some(expires_in_secs),
    )
    .unwrap()
}

/// Body of a successful `/oauth/token` answer.
pub fn token_body(user_id: i64, expires_in_secs: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token(user_id, expires_in_secs),
        "refresh_token": "refresh-next",
        "token_type": "bearer",
        "expires_in": expires_in_secs
    })
}

/// Session manager over in-memory storage, optionally holding `token`.
pub async fn session_with(
    api: &ApiClient,
    token: Option<OauthToken>,
) -> (Arc<SessionManager>, Arc<MemoryTokenStorage>) {
    let storage = Arc::new(MemoryTokenStorage::new());
    let session = Arc::new(SessionManager::new(
        api.clone(),
        &OauthConfig::default(),
        storage.clone(),
    ));
    if let Some(token) = token {
        session.save_token(token).await.unwrap();
    }
    (session, storage)
}

/// Mounts `POST /oauth/token` answering with a fresh token for `user_id`.
#[allow(dead_code)]
pub async fn mount_token_endpoint(server: &MockServer, user_id: i64, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(user_id, 3600)))
        .expect(expected_calls)
        .mount(server)
        .await;
}
