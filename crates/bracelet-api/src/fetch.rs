//! Generic REST verbs
//!
//! [`Fetch`] performs `search`, `get`, `post`, `put`, `patch` and `delete`
//! against one resource path. It resolves the `Authorization` header before
//! every call, encodes query parameters, maps non-success statuses to
//! [`ApiError::HttpStatus`], and runs a [`Transformer`] over response bodies.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bracelet_api::client::ApiClient;
//! use bracelet_api::fetch::{Fetch, RequestOptions};
//! use bracelet_api::transformer::Identity;
//! use bracelet_core::domain::{FilterTerm, QueryParams};
//!
//! # async fn example() -> bracelet_api::Result<()> {
//! let fetch = Fetch::new(ApiClient::with_base_url("http://localhost:8001/v1"), "/patients", "patient");
//! let opts = RequestOptions::new()
//!     .params(QueryParams::new().with_q(FilterTerm::eq("gender", "female")));
//! let page = fetch.search(&opts, &Identity).await?;
//! if let Some(next) = page.next {
//!     let _more = fetch.search(&RequestOptions::new().page(next), &Identity).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use bracelet_core::domain::{QueryEncoder, QueryParams, RawPage, SearchResults};

use crate::client::{ApiClient, ApiRequest, RequestBody};
use crate::transformer::Transformer;
use crate::{ApiError, Result};

/// Source of the `Authorization` header for authenticated endpoints.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the header value, or `None` when no session is active.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidToken`] when a session exists but cannot be
    /// validated or refreshed.
    async fn authorization(&self) -> Result<Option<String>>;
}

// ============================================================================
// Per-call options
// ============================================================================

/// Options shared by every verb.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replaces the resource path for this call
    pub custom_path: Option<String>,
    /// Appended after the resource path (and id)
    pub extra_path: Option<String>,
    pub params: QueryParams,
    /// Entity used for error context instead of the resource's
    pub op_entity: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Continuation URL from a previous search
    pub page: Option<String>,
    /// Explicit `Authorization` value, bypassing the auth provider
    pub authorization: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn custom_path(mut self, path: impl Into<String>) -> Self {
        self.custom_path = Some(path.into());
        self
    }

    pub fn extra_path(mut self, path: impl Into<String>) -> Self {
        self.extra_path = Some(path.into());
        self
    }

    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.op_entity = Some(entity.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }
}

/// Outcome of `post`, `put` and `patch`.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult<T> {
    /// `200`/`201` with a transformed body
    Item(T),
    /// `204`: success without a body
    NoContent,
}

impl<T> MutationResult<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            MutationResult::Item(item) => Some(item),
            MutationResult::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, MutationResult::NoContent)
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// Typed HTTP verbs bound to one resource path.
#[derive(Clone)]
pub struct Fetch {
    api: ApiClient,
    auth: Option<Arc<dyn AuthProvider>>,
    path: String,
    entity: String,
}

impl std::fmt::Debug for Fetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch")
            .field("path", &self.path)
            .field("entity", &self.entity)
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl Fetch {
    /// Creates an anonymous fetcher for `path` (e.g. `/patients`).
    pub fn new(api: ApiClient, path: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            api,
            auth: None,
            path: path.into(),
            entity: entity.into(),
        }
    }

    /// Attaches the provider consulted for the `Authorization` header.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Lists resources, or follows a continuation link when `opts.page` is set.
    ///
    /// Without a page, a `limit` of the configured page size is added unless
    /// the caller set one. Every item goes through `transformer`; the
    /// pagination links are passed through untouched.
    ///
    /// # Errors
    ///
    /// Transport failures, any status other than `200`, malformed bodies and
    /// transformer failures.
    pub async fn search<T, X>(&self, opts: &RequestOptions, transformer: &X) -> Result<SearchResults<T>>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let entity = self.entity_for(opts);
        let authorization = self.authorization(opts).await?;

        if let Some(page) = &opts.page {
            debug!(entity, page = %page, "Following page link");
            let text = self.api.get_url(page, authorization, Some(entity)).await?;
            if text.trim().is_empty() {
                return Ok(SearchResults::empty());
            }
            let raw: RawPage = serde_json::from_str(&text)?;
            return transform_page(raw, transformer).await;
        }

        let mut params = opts.params.clone();
        if !params.has_limit() {
            params = params.with_limit(self.api.page_size());
        }
        let url = self.collection_url(opts, &params);
        debug!(entity, url = %url, "Searching");

        let response = self
            .api
            .execute(self.request(Method::GET, url, opts, authorization))
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ApiError::from_response(response, Some(entity)).await);
        }
        let body = read_body(response, entity).await?;
        if body.is_empty() {
            return Ok(SearchResults::empty());
        }
        let raw: RawPage = serde_json::from_slice(&body)?;
        transform_page(raw, transformer).await
    }

    /// Fetches `path/id[extra_path][?query]`.
    pub async fn get<T, X>(&self, id: impl Display, opts: &RequestOptions, transformer: &X) -> Result<T>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let entity = self.entity_for(opts);
        let authorization = self.authorization(opts).await?;
        let url = self.item_url(&id, opts);

        let response = self
            .api
            .execute(self.request(Method::GET, url, opts, authorization))
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ApiError::from_response(response, Some(entity)).await);
        }
        let body = read_body(response, entity).await?;
        let value: Value = serde_json::from_slice(&body)?;
        transformer.transform(value).await
    }

    /// Creates a resource on `path[extra_path]`.
    pub async fn post<T, X>(
        &self,
        body: RequestBody,
        opts: &RequestOptions,
        transformer: &X,
    ) -> Result<MutationResult<T>>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let url = self.collection_url(opts, &opts.params);
        self.mutate(Method::POST, url, body, opts, transformer).await
    }

    /// Replaces the resource `id`.
    pub async fn put<T, X>(
        &self,
        id: impl Display,
        body: RequestBody,
        opts: &RequestOptions,
        transformer: &X,
    ) -> Result<MutationResult<T>>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let url = self.item_url(&id, opts);
        self.mutate(Method::PUT, url, body, opts, transformer).await
    }

    /// Partially updates the resource `id`.
    pub async fn patch<T, X>(
        &self,
        id: impl Display,
        body: RequestBody,
        opts: &RequestOptions,
        transformer: &X,
    ) -> Result<MutationResult<T>>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let url = self.item_url(&id, opts);
        self.mutate(Method::PATCH, url, body, opts, transformer).await
    }

    /// Deletes the resource `id`; `200` and `204` are success.
    pub async fn delete(&self, id: impl Display, opts: &RequestOptions) -> Result<()> {
        let entity = self.entity_for(opts);
        let authorization = self.authorization(opts).await?;
        // Deletes never carry query parameters.
        let url = self.bare_item_url(&id, opts);

        let response = self
            .api
            .execute(self.request(Method::DELETE, url, opts, authorization))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(ApiError::from_response(response, Some(entity)).await),
        }
    }

    async fn mutate<T, X>(
        &self,
        method: Method,
        url: String,
        body: RequestBody,
        opts: &RequestOptions,
        transformer: &X,
    ) -> Result<MutationResult<T>>
    where
        T: Send,
        X: Transformer<T> + ?Sized,
    {
        let entity = self.entity_for(opts);
        let authorization = self.authorization(opts).await?;

        let request = self.request(method, url, opts, authorization).body(body);
        let response = self.api.execute(request).await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body = read_body(response, entity).await?;
                let value = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(&body)?
                };
                Ok(MutationResult::Item(transformer.transform(value).await?))
            }
            StatusCode::NO_CONTENT => Ok(MutationResult::NoContent),
            _ => Err(ApiError::from_response(response, Some(entity)).await),
        }
    }

    fn request(
        &self,
        method: Method,
        url: String,
        opts: &RequestOptions,
        authorization: Option<String>,
    ) -> ApiRequest {
        ApiRequest::new(method, url)
            .headers(&opts.headers)
            .authorization(authorization)
            .entity(self.entity_for(opts))
    }

    async fn authorization(&self, opts: &RequestOptions) -> Result<Option<String>> {
        if let Some(explicit) = &opts.authorization {
            return Ok(Some(explicit.clone()));
        }
        match &self.auth {
            Some(auth) => auth.authorization().await,
            None => Ok(None),
        }
    }

    fn entity_for<'a>(&'a self, opts: &'a RequestOptions) -> &'a str {
        opts.op_entity.as_deref().unwrap_or(&self.entity)
    }

    fn base_path<'a>(&'a self, opts: &'a RequestOptions) -> &'a str {
        opts.custom_path.as_deref().unwrap_or(&self.path)
    }

    fn collection_url(&self, opts: &RequestOptions, params: &QueryParams) -> String {
        let path = format!(
            "{}{}",
            self.base_path(opts),
            opts.extra_path.as_deref().unwrap_or_default()
        );
        QueryEncoder::encode(params, Some(&self.api.resource_url(&path)))
    }

    /// Item URL without query string.
    fn bare_item_url(&self, id: &dyn Display, opts: &RequestOptions) -> String {
        let path = format!(
            "{}/{}{}",
            self.base_path(opts),
            id,
            opts.extra_path.as_deref().unwrap_or_default()
        );
        self.api.resource_url(&path)
    }

    fn item_url(&self, id: &dyn Display, opts: &RequestOptions) -> String {
        QueryEncoder::encode(&opts.params, Some(&self.bare_item_url(id, opts)))
    }
}

async fn read_body(response: Response, entity: &str) -> Result<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ApiError::transport(e, Some(entity)))
}

async fn transform_page<T, X>(raw: RawPage, transformer: &X) -> Result<SearchResults<T>>
where
    T: Send,
    X: Transformer<T> + ?Sized,
{
    let items = try_join_all(raw.items.into_iter().map(|item| transformer.transform(item))).await?;
    Ok(SearchResults {
        items,
        first: raw.first,
        next: raw.next,
        previous: raw.previous,
    })
}
