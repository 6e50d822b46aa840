//! Integration tests for the OAuth endpoints

use bracelet_api::oauth::OauthController;
use bracelet_core::config::OauthConfig;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn config() -> OauthConfig {
    OauthConfig {
        client_id: Some("web".into()),
        client_secret: Some("s3cret".into()),
        scope: Some("full".into()),
        ..OauthConfig::default()
    }
}

#[tokio::test]
async fn test_password_grant_sends_client_fields() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("scope=full"))
        .and(body_string_contains("client_id=web"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body(3, 600)))
        .expect(1)
        .mount(&server)
        .await;

    let oauth = OauthController::new(api, &config());
    let token = oauth
        .get_token("ana@clinic.test", "pw", None)
        .await
        .expect("token request failed");
    assert_eq!(token.user_id(), Some(3));
    assert_eq!(token.expires_in(), Some(600));
}

#[tokio::test]
async fn test_malformed_access_token_is_rejected() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "not-a-jwt",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    let oauth = OauthController::new(api, &config());
    assert!(oauth.refresh_token("r").await.is_err());
}

#[tokio::test]
async fn test_check_token() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/oauth/check"))
        .and(query_param("token", "good"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/check"))
        .and(query_param("token", "bad"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/check"))
        .and(query_param("token", "boom"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let oauth = OauthController::new(api, &config());
    assert!(oauth.check_token("good").await.unwrap());
    assert!(!oauth.check_token("bad").await.unwrap());
    assert_eq!(oauth.check_token("boom").await.unwrap_err().status(), Some(503));
}

#[tokio::test]
async fn test_revoke_sends_token_and_bearer() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(header("authorization", "Bearer abc"))
        .and(body_json(serde_json::json!({"token": "abc"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let oauth = OauthController::new(api, &config());
    oauth
        .revoke_token("abc", Some("Bearer abc".into()))
        .await
        .expect("revoke failed");
}
