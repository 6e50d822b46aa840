//! Integration tests for the session manager
//!
//! - Refresh inside the 30 second margin, none outside it
//! - Concurrent callers share a single refresh
//! - Refresh failure clears the session
//! - Login error mapping
//! - User profile fetch, caching and error mapping
//! - Best-effort revocation on close, skipped for expired tokens
//! - Permissions of the session user

use std::time::Duration;

use bracelet_api::session::TokenOptions;
use bracelet_api::ApiError;
use bracelet_core::domain::codes::ui;
use bracelet_core::domain::QueryParams;
use bracelet_core::ports::{ITokenStorage, DURABLE_TOKEN_KEY};
use futures_util::future::join_all;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_token_inside_margin_is_refreshed() {
    let (server, api) = common::setup_api_mock().await;
    common::mount_token_endpoint(&server, 5, 1).await;

    let (session, storage) =
        common::session_with(&api, Some(common::token(5, 25, Some("refresh-1")))).await;

    let token = session
        .token(TokenOptions::default())
        .await
        .expect("token failed")
        .expect("expected a token");

    assert_eq!(token.refresh_token(), Some("refresh-next"));
    let stored = storage.load(DURABLE_TOKEN_KEY).unwrap().unwrap();
    assert!(stored.contains("refresh-next"));
}

#[tokio::test]
async fn test_token_outside_margin_is_not_refreshed() {
    let (server, api) = common::setup_api_mock().await;
    common::mount_token_endpoint(&server, 5, 0).await;

    let original = common::token(5, 35, Some("refresh-1"));
    let (session, _) = common::session_with(&api, Some(original.clone())).await;

    let token = session
        .token(TokenOptions::default())
        .await
        .expect("token failed");
    assert_eq!(token, Some(original));
}

#[tokio::test]
async fn test_refresh_request_is_form_encoded() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body(5, 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) =
        common::session_with(&api, Some(common::token(5, -10, Some("refresh-1")))).await;
    assert!(session.is_valid().await);
}

#[tokio::test]
async fn test_concurrent_callers_trigger_one_refresh() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_body(5, 3600))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) =
        common::session_with(&api, Some(common::token(5, 10, Some("refresh-1")))).await;

    let calls = (0..8).map(|_| {
        let session = session.clone();
        async move { session.token(TokenOptions::default()).await }
    });
    let results = join_all(calls).await;

    let first = results[0].as_ref().unwrap().clone().unwrap();
    for result in &results {
        let token = result.as_ref().expect("token failed").as_ref().unwrap();
        assert_eq!(token, &first);
    }
}

#[tokio::test]
async fn test_refresh_failure_clears_session() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "detail": "invalid_grant"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (session, storage) =
        common::session_with(&api, Some(common::token(5, 5, Some("refresh-1")))).await;

    let err = session
        .token(TokenOptions::default())
        .await
        .expect_err("expected invalid token");
    assert!(matches!(err, ApiError::InvalidToken));
    assert_eq!(storage.load(DURABLE_TOKEN_KEY).unwrap(), None);

    // Cleared state does not retry the refresh.
    let lenient = session.token(TokenOptions::lenient()).await.unwrap();
    assert!(lenient.is_none());
}

#[tokio::test]
async fn test_login_saves_token() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=ana%40clinic.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body(12, 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let (session, storage) = common::session_with(&api, None).await;
    let token = session
        .login("ana@clinic.test", "secret")
        .await
        .expect("login failed");

    assert_eq!(token.user_id(), Some(12));
    assert_eq!(session.user_id().await, Some(12));
    assert_eq!(session.user_role().await.as_deref(), Some("doctor"));
    assert!(storage.load(DURABLE_TOKEN_KEY).unwrap().is_some());
}

#[tokio::test]
async fn test_login_failures_are_mapped() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("username=blocked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": 1005,
            "msg": "user blocked"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("username=other"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (session, _) = common::session_with(&api, None).await;

    let blocked = session.login("blocked", "x").await.unwrap_err();
    assert_eq!(blocked.ui_code(), None);
    assert_eq!(blocked.api_ctx().and_then(|c| c.code), Some(1005));

    let other = session.login("other", "x").await.unwrap_err();
    assert_eq!(other.ui_code(), Some(ui::LOGIN_FAILED));
    assert_eq!(other.status(), Some(500));
}

#[tokio::test]
async fn test_user_is_fetched_once_and_cached() {
    let (server, api) = common::setup_api_mock().await;
    let token = common::token(7, 3600, None);

    Mock::given(method("GET"))
        .and(path("/users/7"))
        .and(header("authorization", token.authorization().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7,
            "email": "ana@clinic.test",
            "first_name": "Ana",
            "last_name": "Ruiz"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) = common::session_with(&api, Some(token)).await;

    let user = session.user().await.expect("user failed");
    assert_eq!(user.full_name(), "Ana Ruiz");
    let again = session.user().await.expect("cached user failed");
    assert_eq!(again, user);
}

#[tokio::test]
async fn test_user_errors_are_resignalled() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/users/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/8"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (session, _) = common::session_with(&api, Some(common::token(7, 3600, None))).await;
    let missing = session.user().await.unwrap_err();
    assert_eq!(missing.ui_code(), Some(ui::LOGIN_INVALID_CREDENTIALS));

    session.save_token(common::token(8, 3600, None)).await.unwrap();
    let broken = session.user().await.unwrap_err();
    assert_eq!(broken.ui_code(), Some(ui::EXPIRED_SESSION));
}

#[tokio::test]
async fn test_close_session_clears_even_if_revoke_fails() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (session, storage) =
        common::session_with(&api, Some(common::token(5, 3600, Some("refresh-1")))).await;
    session.close_session().await;

    assert!(!session.is_valid().await);
    assert_eq!(storage.load(DURABLE_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_close_session_skips_revoke_for_expired_token() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (session, storage) = common::session_with(&api, Some(common::token(5, -60, None))).await;
    session.close_session().await;

    assert_eq!(storage.load(DURABLE_TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_user_permissions_on_filters_entity_names() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;

    Mock::given(method("GET"))
        .and(path("/permissions"))
        .and(query_param("q", "entity_name.IN:'patient,study'"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"entity_name": "patient", "read": true},
                {"entity_name": "study", "read": true, "write": true}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let permissions = session
        .user_permissions_on(&["patient", "study"])
        .await
        .expect("permissions failed");
    let names: Vec<&str> = permissions.items.iter().map(|p| p.entity_name.as_str()).collect();
    assert_eq!(names, vec!["patient", "study"]);
}

#[tokio::test]
async fn test_user_permissions_require_a_session() {
    let (_server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, None).await;

    let err = session
        .user_permissions(QueryParams::new())
        .await
        .expect_err("expected an invalid token");
    assert!(matches!(err, ApiError::InvalidToken));
}
