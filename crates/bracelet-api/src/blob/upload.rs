//! Blob upload engine
//!
//! Transfers a file to blob storage through the signed URLs obtained from
//! [`ApiBlobStorage`](super::ApiBlobStorage):
//!
//! - **Single shot**: one URL, one `PUT` of the whole file.
//! - **Multipart**: one URL per fixed-size chunk. A pool of
//!   `min(workers, parts)` workers (at least one) drains a shared FIFO of
//!   [`BlobUploadTask`]s; each part is retried up to `max_attempts` times.
//!   When every part has an ETag the XML manifest is posted to the complete
//!   URL, otherwise the abort URL is called.
//!
//! Workers run as futures on the calling task; concurrency is interleaved
//! I/O, not parallelism.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bracelet_api::blob::{BlobStorage, ProgressFn, SignedUrlResponse};
//! use bracelet_core::config::UploadConfig;
//!
//! # async fn example(signed: SignedUrlResponse, data: Vec<u8>) -> bracelet_api::Result<()> {
//! let storage = BlobStorage::new(UploadConfig::default());
//! let progress: ProgressFn = Arc::new(|sent: u64, total: u64| println!("{sent}/{total}"));
//! let result = storage.upload(&signed, Arc::new(data), Some(progress)).await?;
//! println!("stored at {}", result.blob_url);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bracelet_core::domain::DomainError;
use futures_util::future::join_all;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use bracelet_core::config::UploadConfig;

use super::signed_url::SignedUrlResponse;
use crate::{ApiError, FinalizeStage, Result, BLOB_STORAGE_ENTITY};

/// Size of the body slices handed to the transport; one progress tick each.
const PROGRESS_TICK: usize = 64 * 1024;

/// Receives `(uploaded_bytes, total_bytes)` on every progress tick.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

// ============================================================================
// Tasks and results
// ============================================================================

/// One chunk of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUploadTask {
    /// 1-based chunk index
    pub part_number: u32,
    pub url: String,
    /// Byte range of the chunk within the file
    pub range: Range<u64>,
    /// Set only once the storage acknowledged the part
    pub etag: Option<String>,
    pub uploaded_bytes: u64,
}

impl BlobUploadTask {
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Slices a file of `size` bytes into one task per URL, in order.
pub fn blob_parts(size: u64, chunk_size: u64, urls: &[String]) -> Vec<BlobUploadTask> {
    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let index = index as u64;
            let start = (chunk_size * index).min(size);
            let end = (chunk_size * (index + 1)).min(size);
            BlobUploadTask {
                part_number: (index + 1) as u32,
                url: url.clone(),
                range: start..end,
                etag: None,
                uploaded_bytes: 0,
            }
        })
        .collect()
}

/// An acknowledged part, as listed in the completion manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Renders the completion manifest, parts in ascending order.
pub fn parts_to_xml(parts: &[CompletedPart]) -> String {
    let mut sorted: Vec<&CompletedPart> = parts.iter().collect();
    sorted.sort_by_key(|p| p.part_number);
    let body: String = sorted
        .iter()
        .map(|p| {
            format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                p.part_number, p.etag
            )
        })
        .collect();
    format!("<CompleteMultipartUpload>{body}</CompleteMultipartUpload>")
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Origin and path of the stored blob, without signature
    pub blob_url: String,
    /// Acknowledged parts (multipart only)
    pub parts: Option<Vec<CompletedPart>>,
    /// ETag of the stored object (single shot only)
    pub etag: Option<String>,
}

// ============================================================================
// Progress accounting
// ============================================================================

struct Progress {
    parts: Vec<AtomicU64>,
    total: u64,
    callback: Option<ProgressFn>,
}

impl Progress {
    fn new(parts: usize, total: u64, callback: Option<ProgressFn>) -> Self {
        Self {
            parts: (0..parts).map(|_| AtomicU64::new(0)).collect(),
            total,
            callback,
        }
    }

    fn set(&self, slot: usize, bytes: u64) {
        if let Some(counter) = self.parts.get(slot) {
            counter.store(bytes, Ordering::Relaxed);
        }
        if let Some(callback) = &self.callback {
            callback(self.uploaded(), self.total);
        }
    }

    fn uploaded(&self) -> u64 {
        self.parts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// Streams `data[range]` in ticks, reporting bytes handed to the transport.
fn progress_body(
    data: Arc<Vec<u8>>,
    range: Range<u64>,
    progress: Arc<Progress>,
    slot: usize,
) -> reqwest::Body {
    let start = range.start as usize;
    let end = range.end as usize;
    let offsets: Vec<usize> = (start..end).step_by(PROGRESS_TICK).collect();
    let stream = futures_util::stream::iter(offsets.into_iter().map(move |offset| {
        let stop = (offset + PROGRESS_TICK).min(end);
        progress.set(slot, (stop - start) as u64);
        Ok::<_, std::io::Error>(data[offset..stop].to_vec())
    }));
    reqwest::Body::wrap_stream(stream)
}

/// Part numbers of `expected` that did not settle with an ETag.
fn unacknowledged_parts(
    expected: &[u32],
    settled: &[(BlobUploadTask, Option<ApiError>)],
) -> Vec<u32> {
    expected
        .iter()
        .copied()
        .filter(|number| {
            !settled
                .iter()
                .any(|(task, _)| task.part_number == *number && task.etag.is_some())
        })
        .collect()
}

fn blob_url(signed_url: &str) -> Result<String> {
    let url = Url::parse(signed_url)
        .map_err(|e| ApiError::InvalidResponse(format!("invalid signed URL: {e}")))?;
    Ok(format!("{}{}", url.origin().ascii_serialization(), url.path()))
}

// ============================================================================
// BlobStorage
// ============================================================================

/// Uploads and deletes blobs through signed URLs
///
/// Signed URLs carry their own authorization, so no API token is sent.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    http: Client,
    config: UploadConfig,
}

impl BlobStorage {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Replaces the underlying HTTP client.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `data` following `signed`.
    ///
    /// Dispatches on the number of URLs: exactly one means single shot,
    /// whatever the file size.
    ///
    /// # Errors
    ///
    /// - [`ApiError::SimpleUpload`] if the single-shot `PUT` fails
    /// - [`ApiError::MultipartFinalize`] if the completion call fails
    ///   (stage `Complete`) or parts failed and the upload was aborted
    ///   (stage `Abort`, `aborted` telling whether the abort call succeeded)
    pub async fn upload(
        &self,
        signed: &SignedUrlResponse,
        data: Arc<Vec<u8>>,
        progress: Option<ProgressFn>,
    ) -> Result<UploadResult> {
        match signed.urls.as_slice() {
            [] => Err(ApiError::InvalidResponse("signed URL response has no URLs".into())),
            [url] => self.simple_upload(url, data, progress).await,
            urls => self.multipart_upload(signed, urls, data, progress).await,
        }
    }

    /// Removes a blob through its signed delete URL.
    pub async fn delete(&self, url: &str) -> Result<()> {
        self.request(Method::DELETE, url, None)
            .await
            .map_err(|e| ApiError::BlobDelete {
                source: Box::new(e),
            })?;
        info!("Blob deleted");
        Ok(())
    }

    async fn simple_upload(
        &self,
        url: &str,
        data: Arc<Vec<u8>>,
        progress: Option<ProgressFn>,
    ) -> Result<UploadResult> {
        let size = data.len() as u64;
        debug!(size, "Starting single-shot upload");
        let progress = Arc::new(Progress::new(1, size, progress));

        let etag = self
            .put_range(url, data, 0..size, &progress, 0)
            .await
            .map_err(|e| ApiError::SimpleUpload {
                source: Box::new(e),
            })?;

        info!(size, "Single-shot upload finished");
        Ok(UploadResult {
            blob_url: blob_url(url)?,
            parts: None,
            etag,
        })
    }

    async fn multipart_upload(
        &self,
        signed: &SignedUrlResponse,
        urls: &[String],
        data: Arc<Vec<u8>>,
        progress: Option<ProgressFn>,
    ) -> Result<UploadResult> {
        let size = data.len() as u64;
        let tasks = blob_parts(size, self.config.chunk_size_bytes(), urls);
        let covered = tasks.last().map_or(0, |t| t.range.end);
        if covered < size {
            return Err(DomainError::ValidationFailed(format!(
                "{} parts of {} bytes cover {covered} of {size} bytes",
                tasks.len(),
                self.config.chunk_size_bytes()
            ))
            .into());
        }
        let part_numbers: Vec<u32> = tasks.iter().map(|t| t.part_number).collect();
        let part_count = tasks.len();
        let worker_count = self.config.workers.clamp(1, part_count.max(1));
        info!(size, parts = part_count, workers = worker_count, "Starting multipart upload");

        let progress = Arc::new(Progress::new(part_count, size, progress));
        let queue = Mutex::new(tasks.into_iter().collect::<VecDeque<_>>());

        let workers = (0..worker_count).map(|worker_id| {
            self.run_worker(worker_id, &queue, Arc::clone(&data), Arc::clone(&progress))
        });
        let mut settled: Vec<(BlobUploadTask, Option<ApiError>)> =
            join_all(workers).await.into_iter().flatten().collect();
        settled.sort_by_key(|(task, _)| task.part_number);

        // A part counts as failed unless a worker settled it with an ETag.
        let failed_parts = unacknowledged_parts(&part_numbers, &settled);

        if failed_parts.is_empty() {
            let parts: Vec<CompletedPart> = settled
                .into_iter()
                .filter_map(|(task, _)| {
                    task.etag.map(|etag| CompletedPart {
                        part_number: task.part_number,
                        etag,
                    })
                })
                .collect();
            return self.complete(signed, parts).await;
        }

        let first_failure = settled.into_iter().find_map(|(_, err)| err);
        Err(self.abort(signed, failed_parts, first_failure).await)
    }

    async fn complete(
        &self,
        signed: &SignedUrlResponse,
        parts: Vec<CompletedPart>,
    ) -> Result<UploadResult> {
        let complete_url = signed
            .complete_url
            .as_deref()
            .ok_or_else(|| ApiError::InvalidResponse("multipart upload has no complete URL".into()))?;

        if let Err(e) = self
            .request(Method::POST, complete_url, Some(parts_to_xml(&parts)))
            .await
        {
            error!(error = %e, "Multipart completion failed");
            return Err(ApiError::MultipartFinalize {
                stage: FinalizeStage::Complete,
                aborted: false,
                failed_parts: Vec::new(),
                source: Some(Box::new(e)),
            });
        }

        info!(parts = parts.len(), "Multipart upload completed");
        Ok(UploadResult {
            blob_url: blob_url(complete_url)?,
            parts: Some(parts),
            etag: None,
        })
    }

    async fn abort(
        &self,
        signed: &SignedUrlResponse,
        failed_parts: Vec<u32>,
        part_error: Option<ApiError>,
    ) -> ApiError {
        warn!(failed_parts = ?failed_parts, "Parts failed, aborting multipart upload");

        let abort_result = match signed.abort_url.as_deref() {
            Some(url) => self.request(Method::POST, url, None).await,
            None => Err(ApiError::InvalidResponse("multipart upload has no abort URL".into())),
        };

        let (aborted, source) = match abort_result {
            Ok(()) => (true, part_error),
            Err(e) => {
                error!(error = %e, "Multipart abort failed");
                (false, Some(e))
            }
        };
        ApiError::MultipartFinalize {
            stage: FinalizeStage::Abort,
            aborted,
            failed_parts,
            source: source.map(Box::new),
        }
    }

    /// Dequeues and executes tasks until the queue is empty.
    async fn run_worker(
        &self,
        worker_id: usize,
        queue: &Mutex<VecDeque<BlobUploadTask>>,
        data: Arc<Vec<u8>>,
        progress: Arc<Progress>,
    ) -> Vec<(BlobUploadTask, Option<ApiError>)> {
        let mut settled = Vec::new();
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(mut task) = next else {
                break;
            };
            debug!(worker_id, part = task.part_number, "Worker picked part");
            let failure = self.execute_task(&mut task, &data, &progress).await;
            settled.push((task, failure));
        }
        debug!(worker_id, parts = settled.len(), "Worker finished");
        settled
    }

    /// Uploads one part with retries. Leaves `etag` unset on permanent
    /// failure and returns the last error.
    async fn execute_task(
        &self,
        task: &mut BlobUploadTask,
        data: &Arc<Vec<u8>>,
        progress: &Arc<Progress>,
    ) -> Option<ApiError> {
        let slot = (task.part_number as usize).saturating_sub(1);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self
                .put_range(&task.url, Arc::clone(data), task.range.clone(), progress, slot)
                .await
            {
                Ok(Some(etag)) => {
                    task.etag = Some(etag);
                    task.uploaded_bytes = task.len();
                    return None;
                }
                Ok(None) => {
                    last_error = Some(ApiError::InvalidResponse(format!(
                        "part {} acknowledged without ETag",
                        task.part_number
                    )));
                }
                Err(e) => last_error = Some(e),
            }

            task.uploaded_bytes = 0;
            progress.set(slot, 0);
            if let Some(e) = &last_error {
                warn!(part = task.part_number, attempt, max_attempts, error = %e, "Part upload failed");
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.config.backoff.delay(attempt)).await;
            }
        }

        error!(part = task.part_number, attempts = max_attempts, "Part upload exhausted its attempts");
        last_error.map(|source| ApiError::UploadPart {
            part_number: task.part_number,
            attempts: max_attempts,
            source: Box::new(source),
        })
    }

    /// `PUT`s `data[range]` and returns the response ETag, unquoted.
    async fn put_range(
        &self,
        url: &str,
        data: Arc<Vec<u8>>,
        range: Range<u64>,
        progress: &Arc<Progress>,
        slot: usize,
    ) -> Result<Option<String>> {
        let length = range.end - range.start;
        let body = progress_body(data, range, Arc::clone(progress), slot);
        let response = self
            .http
            .put(url)
            .header(CONTENT_LENGTH, length)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(e, Some(BLOB_STORAGE_ENTITY)))?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response, Some(BLOB_STORAGE_ENTITY)).await);
        }
        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string()))
    }

    /// Plain storage call (complete, abort, delete); `200` and `204` succeed.
    async fn request(&self, method: Method, url: &str, xml: Option<String>) -> Result<()> {
        let mut builder = self.http.request(method, url);
        if let Some(xml) = xml {
            builder = builder.header(CONTENT_TYPE, "application/xml").body(xml);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(e, Some(BLOB_STORAGE_ENTITY)))?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(ApiError::from_response(response, Some(BLOB_STORAGE_ENTITY)).await),
        }
    }
}
