//! Platform REST API client
//!
//! Thin wrapper over `reqwest::Client` that knows the API root, rewrites
//! links handed out through a local reverse proxy, injects the
//! `Authorization` header, and applies the OAuth token endpoint's
//! form-urlencoded convention.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bracelet_api::client::{ApiClient, ApiRequest};
//! use bracelet_core::config::ApiConfig;
//! use reqwest::Method;
//!
//! # async fn example() -> bracelet_api::Result<()> {
//! let client = ApiClient::new(&ApiConfig::default())?;
//! let url = client.resource_url("/pathologies");
//! let response = client.execute(ApiRequest::new(Method::GET, url)).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use bracelet_core::config::ApiConfig;

use crate::{ApiError, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Path suffix of the OAuth token endpoint.
const OAUTH_TOKEN_SUFFIX: &str = "/oauth/token";

// ============================================================================
// Request description
// ============================================================================

/// Body of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized as JSON, or form-encoded when sent to the token endpoint.
    Json(Value),
    /// Sent verbatim.
    Raw(String),
    /// Form-urlencoded pairs.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// JSON body from any serializable value.
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(raw: String) -> Self {
        RequestBody::Raw(raw)
    }
}

/// A request to the API, before URL normalization.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Value for the `Authorization` header; never sent to the token endpoint.
    pub authorization: Option<String>,
    /// Entity used to contextualize transport failures.
    pub entity: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            authorization: None,
            entity: None,
        }
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend_from_slice(headers);
        self
    }

    pub fn authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client bound to one platform API deployment
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    /// Scheme, host and port of the API server
    origin: String,
    /// Version prefix, e.g. `/v1` (may be empty)
    api_version: String,
    rewrite_hosts: Vec<String>,
    page_size: u32,
    page_max_size: u32,
}

impl ApiClient {
    /// Creates a client from the `api` configuration section.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let parsed = Url::parse(&config.host)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid API host '{}': {e}", config.host)))?;
        Ok(Self {
            http: Client::new(),
            origin: parsed.origin().ascii_serialization(),
            api_version: config.api_version.trim_end_matches('/').to_string(),
            rewrite_hosts: config.rewrite_hosts.clone(),
            page_size: config.page_size,
            page_max_size: config.page_max_size,
        })
    }

    /// Creates a client rooted directly at `base_url` with no version prefix
    /// (useful for testing against a mock server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let defaults = ApiConfig::default();
        Self {
            http: Client::new(),
            origin: base_url.into().trim_end_matches('/').to_string(),
            api_version: String::new(),
            rewrite_hosts: Vec::new(),
            page_size: defaults.page_size,
            page_max_size: defaults.page_max_size,
        }
    }

    /// Replaces the underlying HTTP client (timeouts, proxies, ...).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_rewrite_hosts(mut self, hosts: Vec<String>) -> Self {
        self.rewrite_hosts = hosts;
        self
    }

    pub fn with_page_sizes(mut self, page_size: u32, page_max_size: u32) -> Self {
        self.page_size = page_size;
        self.page_max_size = page_max_size;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Origin plus version prefix.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.origin, self.api_version)
    }

    /// Default `limit` for searches.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_max_size(&self) -> u32 {
        self.page_max_size
    }

    /// Absolute URL of a resource path, e.g. `/patients/3`.
    pub fn resource_url(&self, path: &str) -> String {
        format!("{}{}", self.api_root(), path)
    }

    /// Returns true if `url` targets the OAuth token endpoint.
    pub fn is_oauth_url(url: &str) -> bool {
        let parsed = Url::parse(url)
            .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(url)));
        match parsed {
            Ok(u) => u.path().ends_with(OAUTH_TOKEN_SUFFIX),
            Err(_) => false,
        }
    }

    /// Rewrites links addressed to a reverse-proxy host onto this client's
    /// origin. Token endpoint URLs are returned untouched.
    pub fn normalize_url(&self, url: &str) -> String {
        if Self::is_oauth_url(url) {
            return url.to_string();
        }

        let mut out = url.to_string();
        if let Ok(parsed) = Url::parse(url) {
            let host = parsed.host_str().unwrap_or_default();
            let authority = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            if self.rewrite_hosts.iter().any(|h| h == &authority) {
                out = match parsed.query() {
                    Some(q) => format!("{}?{q}", parsed.path()),
                    None => parsed.path().to_string(),
                };
            }
        }

        if out.starts_with('/') {
            if !self.api_version.is_empty() && out.starts_with(&self.api_version) {
                out = format!("{}{out}", self.origin);
            } else {
                out = format!("{}{out}", self.api_root());
            }
        }
        out
    }

    /// Sends `request` and returns the raw response, whatever its status.
    ///
    /// # Errors
    ///
    /// [`ApiError::Transport`] if no response was received.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response> {
        let is_oauth = Self::is_oauth_url(&request.url);
        let url = self.normalize_url(&request.url);

        let mut builder = self.http.request(request.method.clone(), &url);

        if is_oauth {
            builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
        } else if !request.has_header(CONTENT_TYPE.as_str()) {
            builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        }
        for (name, value) in &request.headers {
            if is_oauth && name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !is_oauth {
            if let Some(auth) = &request.authorization {
                builder = builder.header(AUTHORIZATION, auth.as_str());
            }
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Raw(raw) => builder.body(raw),
            RequestBody::Json(value) if is_oauth => builder.body(form_encode_json(&value)),
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Form(pairs) => builder.body(form_encode(&pairs)),
        };

        debug!(method = %request.method, url = %url, "Sending API request");

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(e, request.entity.as_deref()))?;

        debug!(status = response.status().as_u16(), url = %url, "API response");
        Ok(response)
    }

    /// GETs an absolute or relative URL verbatim and returns the body text.
    ///
    /// Used to follow pagination links.
    pub async fn get_url(
        &self,
        url: &str,
        authorization: Option<String>,
        entity: Option<&str>,
    ) -> Result<String> {
        let mut request = ApiRequest::new(Method::GET, url).authorization(authorization);
        if let Some(entity) = entity {
            request = request.entity(entity);
        }
        let response = self.execute(request).await?;
        if response.status() == StatusCode::OK {
            return response
                .text()
                .await
                .map_err(|e| ApiError::transport(e, entity));
        }
        Err(ApiError::from_response(response, entity).await)
    }
}

fn form_encode(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Form-encodes the top-level members of a JSON object; nulls are skipped.
fn form_encode_json(value: &Value) -> String {
    let Some(obj) = value.as_object() else {
        return match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };
    let pairs: Vec<(String, String)> = obj
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect();
    form_encode(&pairs)
}
