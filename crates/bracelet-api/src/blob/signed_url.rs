//! Signed-URL endpoints of the platform API
//!
//! Every blob-backed resource exposes `<root>/bs-signed-url` (collection)
//! and `<root>/<id>/bs-signed-url` (item). The API answers with time-limited
//! storage URLs; the transfer itself is done by
//! [`BlobStorage`](super::BlobStorage).

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ApiClient, ApiRequest, RequestBody};
use crate::fetch::AuthProvider;
use crate::{ApiError, Result, BLOB_STORAGE_ENTITY};

const SIGNED_URL_SUFFIX: &str = "/bs-signed-url";

/// Number of parts to request for a file of `size` bytes.
///
/// Files up to one chunk are uploaded in a single part.
pub fn num_parts(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 || size <= chunk_size {
        return 1;
    }
    size.div_ceil(chunk_size)
}

// ============================================================================
// Payloads
// ============================================================================

/// Body of a signed-URL request for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrlRequest {
    /// Reserved resource id (creation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub filename: String,
    pub num_parts: u64,
}

impl SignedUrlRequest {
    /// Request for a new blob, optionally bound to a reserved id.
    pub fn for_upload(
        filename: impl Into<String>,
        size: u64,
        chunk_size: u64,
        reserved_id: Option<i64>,
    ) -> Self {
        Self {
            id: reserved_id,
            filename: filename.into(),
            num_parts: num_parts(size, chunk_size),
        }
    }

    /// Request replacing the blob of an existing resource.
    pub fn for_replace(filename: impl Into<String>, size: u64, chunk_size: u64) -> Self {
        Self::for_upload(filename, size, chunk_size, None)
    }
}

/// Upload instructions returned by `POST`/`PUT .../bs-signed-url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    #[serde(default)]
    pub upload_id: Option<String>,
    /// One URL per part; a single URL means a single-shot upload
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub delete_url: Option<String>,
    #[serde(default)]
    pub complete_url: Option<String>,
    #[serde(default)]
    pub abort_url: Option<String>,
    /// Id reserved for the resource being created (`POST` only)
    #[serde(default)]
    pub reserved_id: Option<i64>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl SignedUrlResponse {
    pub fn is_multipart(&self) -> bool {
        self.urls.len() > 1
    }
}

#[derive(Debug, Deserialize)]
struct DisplayUrlResponse {
    display_url: String,
}

/// Signed delete URL of one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSignedUrl {
    pub delete_url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

/// Identifies a blob in a multi-delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobFileRef {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

// ============================================================================
// ApiBlobStorage
// ============================================================================

/// Authenticated client for the signed-URL endpoints
#[derive(Clone)]
pub struct ApiBlobStorage {
    api: ApiClient,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl std::fmt::Debug for ApiBlobStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBlobStorage")
            .field("api", &self.api)
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl ApiBlobStorage {
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self { api, auth }
    }

    /// `GET <root>/<id>/bs-signed-url`: URL to display or download the blob.
    pub async fn get_signed_url(&self, id: i64, root: &str) -> Result<String> {
        let url = self.item_url(root, id);
        let body: DisplayUrlResponse = self
            .call(Method::GET, url, RequestBody::Empty, &[StatusCode::OK])
            .await?;
        Ok(body.display_url)
    }

    /// `POST <root>/bs-signed-url` for one new file.
    pub async fn post_signed_url(
        &self,
        request: &SignedUrlRequest,
        root: &str,
    ) -> Result<SignedUrlResponse> {
        let url = self.collection_url(root);
        self.call(Method::POST, url, RequestBody::json(request)?, CREATED_OK)
            .await
    }

    /// `POST <root>/bs-signed-url` for several files at once.
    pub async fn post_multi_signed_url(
        &self,
        requests: &[SignedUrlRequest],
        root: &str,
    ) -> Result<Vec<SignedUrlResponse>> {
        let url = self.collection_url(root);
        self.call(Method::POST, url, RequestBody::json(requests)?, CREATED_OK)
            .await
    }

    /// `PUT <root>/<id>/bs-signed-url` to replace the blob of `id`.
    ///
    /// The request id is never sent; the path carries it.
    pub async fn put_signed_url(
        &self,
        id: i64,
        request: &SignedUrlRequest,
        root: &str,
    ) -> Result<SignedUrlResponse> {
        let payload = SignedUrlRequest {
            id: None,
            ..request.clone()
        };
        let url = self.item_url(root, id);
        self.call(Method::PUT, url, RequestBody::json(&payload)?, CREATED_OK)
            .await
    }

    /// `DELETE <root>/<id>/bs-signed-url`: signed URL that removes the blob.
    pub async fn delete_signed_url(&self, id: i64, root: &str) -> Result<DeleteSignedUrl> {
        let url = self.item_url(root, id);
        self.call(Method::DELETE, url, RequestBody::Empty, &[StatusCode::OK])
            .await
    }

    /// `DELETE <root>/bs-signed-url` with the files in the body.
    pub async fn delete_multi_signed_url(
        &self,
        files: &[BlobFileRef],
        root: &str,
    ) -> Result<Vec<DeleteSignedUrl>> {
        let url = self.collection_url(root);
        self.call(Method::DELETE, url, RequestBody::json(files)?, &[StatusCode::OK])
            .await
    }

    fn collection_url(&self, root: &str) -> String {
        self.api.resource_url(&format!("{root}{SIGNED_URL_SUFFIX}"))
    }

    fn item_url(&self, root: &str, id: i64) -> String {
        self.api
            .resource_url(&format!("{root}/{id}{SIGNED_URL_SUFFIX}"))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: RequestBody,
        accepted: &[StatusCode],
    ) -> Result<T> {
        let authorization = match &self.auth {
            Some(auth) => auth.authorization().await?,
            None => None,
        };
        debug!(method = %method, url = %url, "Requesting signed URL");
        let request = ApiRequest::new(method, url)
            .body(body)
            .authorization(authorization)
            .entity(BLOB_STORAGE_ENTITY);
        let response = self.api.execute(request).await?;
        if !accepted.contains(&response.status()) {
            return Err(ApiError::from_response(response, Some(BLOB_STORAGE_ENTITY)).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(e, Some(BLOB_STORAGE_ENTITY)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

const CREATED_OK: &[StatusCode] = &[StatusCode::OK, StatusCode::CREATED];
