//! OAuth endpoints of the platform API
//!
//! - `POST /oauth/token` - password and refresh-token grants (form body)
//! - `GET /oauth/check?token=..` - token introspection, `204` when valid
//! - `POST /oauth/revoke` - server-side revocation
//!
//! Client credentials and the default scope come from [`OauthConfig`].

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use bracelet_core::config::OauthConfig;
use bracelet_core::domain::{OauthToken, TokenRecord};

use crate::client::{ApiClient, ApiRequest, RequestBody};
use crate::fetch::{Fetch, MutationResult, RequestOptions};
use crate::{ApiError, Result};

/// Entity name attached to OAuth failures.
pub const OAUTH_ENTITY: &str = "oauth";

const OAUTH_PATH: &str = "/oauth";

/// Client for the token, check and revoke endpoints
#[derive(Debug, Clone)]
pub struct OauthController {
    fetch: Fetch,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: Option<String>,
}

impl OauthController {
    pub fn new(api: ApiClient, config: &OauthConfig) -> Self {
        Self {
            fetch: Fetch::new(api, OAUTH_PATH, OAUTH_ENTITY),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
        }
    }

    /// Exchanges user credentials for a token (password grant).
    ///
    /// # Arguments
    /// * `username` - Account email
    /// * `password` - Account password
    /// * `scope` - Requested scope; falls back to the configured one
    pub async fn get_token(
        &self,
        username: &str,
        password: &str,
        scope: Option<&str>,
    ) -> Result<OauthToken> {
        info!(username, "Requesting OAuth token");
        let mut form = vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        self.push_client_fields(&mut form, scope);
        self.grant(form).await
    }

    /// Exchanges a refresh token for a new token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OauthToken> {
        debug!("Requesting token refresh");
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        self.push_client_fields(&mut form, None);
        self.grant(form).await
    }

    /// Asks the server whether `token` is still accepted.
    ///
    /// # Returns
    /// `true` on `204`, `false` when the server rejects the token
    /// (`400`, `401`, `403`).
    pub async fn check_token(&self, token: &str) -> Result<bool> {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("token", token)
            .finish();
        let url = format!("{}?{query}", self.fetch.api().resource_url("/oauth/check"));
        let response = self
            .fetch
            .api()
            .execute(ApiRequest::new(Method::GET, url).entity(OAUTH_ENTITY))
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            _ => Err(ApiError::from_response(response, Some(OAUTH_ENTITY)).await),
        }
    }

    /// Revokes `token` on the server.
    ///
    /// # Arguments
    /// * `token` - Access token to revoke
    /// * `authorization` - Header authenticating the call, usually the
    ///   same token as a bearer
    pub async fn revoke_token(&self, token: &str, authorization: Option<String>) -> Result<()> {
        let mut opts = RequestOptions::new().extra_path("/revoke");
        if let Some(auth) = authorization {
            opts = opts.authorization(auth);
        }
        let body = RequestBody::Json(serde_json::json!({ "token": token }));
        let discard = |_: Value| -> Result<()> { Ok(()) };
        self.fetch.post::<(), _>(body, &opts, &discard).await?;
        info!("OAuth token revoked");
        Ok(())
    }

    fn push_client_fields(&self, form: &mut Vec<(String, String)>, scope: Option<&str>) {
        if let Some(scope) = scope.or(self.scope.as_deref()) {
            form.push(("scope".to_string(), scope.to_string()));
        }
        if let Some(id) = &self.client_id {
            form.push(("client_id".to_string(), id.clone()));
        }
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
    }

    async fn grant(&self, form: Vec<(String, String)>) -> Result<OauthToken> {
        let opts = RequestOptions::new().extra_path("/token");
        let to_token = |raw: Value| -> Result<OauthToken> {
            let record: TokenRecord = serde_json::from_value(raw)?;
            Ok(OauthToken::try_from(record)?)
        };
        match self.fetch.post(RequestBody::Form(form), &opts, &to_token).await? {
            MutationResult::Item(token) => Ok(token),
            MutationResult::NoContent => {
                Err(ApiError::InvalidResponse("token endpoint returned no content".into()))
            }
        }
    }
}
