//! Integration tests for the blob upload engine
//!
//! - Multipart upload: all parts succeed, completion lists them in order
//! - Part retries, then permanent failure with abort
//! - Worker pool bounds and misconfigured pools
//! - Single-shot dispatch
//! - Signed-URL endpoints and blob deletion

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bracelet_api::blob::{ApiBlobStorage, BlobStorage, ProgressFn, SignedUrlRequest, SignedUrlResponse};
use bracelet_api::{ApiError, FinalizeStage};
use bracelet_core::config::{BackoffConfig, UploadConfig};
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::common;

const MIB: usize = 1024 * 1024;

fn engine(workers: usize, max_attempts: u32) -> BlobStorage {
    BlobStorage::new(UploadConfig {
        chunk_size_mb: 1,
        workers,
        max_attempts,
        backoff: BackoffConfig::Fixed { delay_ms: 0 },
    })
}

fn signed_parts(server: &MockServer, parts: u32) -> SignedUrlResponse {
    let base = format!("{}/bucket/manual.pdf", server.uri());
    SignedUrlResponse {
        upload_id: Some("up-1".into()),
        urls: (1..=parts)
            .map(|n| format!("{base}?uploadId=up-1&partNumber={n}"))
            .collect(),
        complete_url: Some(format!("{base}?uploadId=up-1&action=complete")),
        abort_url: Some(format!("{base}?uploadId=up-1&action=abort")),
        ..Default::default()
    }
}

async fn mount_part(server: &MockServer, part: u32, status: u16, expected_calls: u64) {
    let mut response = ResponseTemplate::new(status);
    if (200..300).contains(&status) {
        response = response.insert_header("ETag", format!("\"etag-{part}\"").as_str());
    }
    Mock::given(method("PUT"))
        .and(path("/bucket/manual.pdf"))
        .and(query_param("partNumber", part.to_string().as_str()))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_finalize(server: &MockServer, action: &str, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/bucket/manual.pdf"))
        .and(query_param("action", action))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_multipart_upload_completes_in_part_order() {
    let server = MockServer::start().await;
    for part in 1..=3 {
        mount_part(&server, part, 200, 1).await;
    }
    Mock::given(method("POST"))
        .and(path("/bucket/manual.pdf"))
        .and(query_param("action", "complete"))
        .and(header("content-type", "application/xml"))
        .and(body_string(
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>etag-1</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>etag-2</ETag></Part>\
             <Part><PartNumber>3</PartNumber><ETag>etag-3</ETag></Part>\
             </CompleteMultipartUpload>",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_finalize(&server, "abort", 204, 0).await;

    let uploaded = Arc::new(AtomicU64::new(0));
    let seen = uploaded.clone();
    let progress: ProgressFn = Arc::new(move |loaded: u64, _total: u64| {
        seen.fetch_max(loaded, Ordering::SeqCst);
    });

    let data = Arc::new(vec![7u8; 2 * MIB + MIB / 2]);
    let result = engine(2, 3)
        .upload(&signed_parts(&server, 3), data.clone(), Some(progress))
        .await
        .expect("upload failed");

    assert_eq!(result.blob_url, format!("{}/bucket/manual.pdf", server.uri()));
    let parts = result.parts.expect("multipart result lists parts");
    let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(parts[2].etag, "etag-3");
    assert_eq!(uploaded.load(Ordering::SeqCst), data.len() as u64);
}

#[tokio::test]
async fn test_failed_part_is_retried() {
    let server = MockServer::start().await;
    mount_part(&server, 1, 200, 1).await;
    // First attempt of part 2 fails, the retry succeeds.
    Mock::given(method("PUT"))
        .and(path("/bucket/manual.pdf"))
        .and(query_param("partNumber", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_part(&server, 2, 200, 1).await;
    mount_finalize(&server, "complete", 200, 1).await;
    mount_finalize(&server, "abort", 204, 0).await;

    let data = Arc::new(vec![1u8; MIB + 10]);
    let result = engine(2, 5)
        .upload(&signed_parts(&server, 2), data, None)
        .await
        .expect("upload failed");
    assert_eq!(result.parts.map(|p| p.len()), Some(2));
}

#[tokio::test]
async fn test_exhausted_part_aborts_upload() {
    let server = MockServer::start().await;
    mount_part(&server, 1, 200, 1).await;
    mount_part(&server, 2, 500, 3).await;
    mount_finalize(&server, "complete", 200, 0).await;
    mount_finalize(&server, "abort", 204, 1).await;

    let data = Arc::new(vec![1u8; 2 * MIB]);
    let err = engine(2, 3)
        .upload(&signed_parts(&server, 2), data, None)
        .await
        .expect_err("expected an aborted upload");

    match err {
        ApiError::MultipartFinalize {
            stage,
            aborted,
            failed_parts,
            source,
        } => {
            assert_eq!(stage, FinalizeStage::Abort);
            assert!(aborted);
            assert_eq!(failed_parts, vec![2]);
            assert!(matches!(
                source.as_deref(),
                Some(ApiError::UploadPart {
                    part_number: 2,
                    attempts: 3,
                    ..
                })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_abort_is_reported() {
    let server = MockServer::start().await;
    mount_part(&server, 1, 500, 2).await;
    mount_part(&server, 2, 500, 2).await;
    mount_finalize(&server, "abort", 500, 1).await;

    let data = Arc::new(vec![1u8; MIB + 1]);
    let err = engine(4, 2)
        .upload(&signed_parts(&server, 2), data, None)
        .await
        .expect_err("expected a failed abort");

    assert!(matches!(
        err,
        ApiError::MultipartFinalize {
            stage: FinalizeStage::Abort,
            aborted: false,
            ..
        }
    ));
    let extra = err.extra_args().unwrap();
    assert_eq!(extra["aborted"], false);
    assert_eq!(extra["failed_parts"], serde_json::json!([1, 2]));
}

#[tokio::test]
async fn test_completion_failure_is_reported() {
    let server = MockServer::start().await;
    mount_part(&server, 1, 200, 1).await;
    mount_part(&server, 2, 200, 1).await;
    mount_finalize(&server, "complete", 500, 1).await;

    let err = engine(2, 1)
        .upload(&signed_parts(&server, 2), Arc::new(vec![0u8; MIB + 1]), None)
        .await
        .expect_err("expected a completion failure");
    assert!(matches!(
        err,
        ApiError::MultipartFinalize {
            stage: FinalizeStage::Complete,
            ..
        }
    ));
    assert_eq!(err.extra_args().unwrap()["completed"], false);
}

#[tokio::test]
async fn test_single_url_is_uploaded_in_one_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bucket/photo.png"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"whole\""))
        .expect(1)
        .mount(&server)
        .await;

    let signed = SignedUrlResponse {
        urls: vec![format!("{}/bucket/photo.png?sig=abc", server.uri())],
        ..Default::default()
    };
    let result = engine(4, 5)
        .upload(&signed, Arc::new(vec![9u8; 2048]), None)
        .await
        .expect("upload failed");

    assert_eq!(result.etag.as_deref(), Some("whole"));
    assert!(result.parts.is_none());
    assert_eq!(result.blob_url, format!("{}/bucket/photo.png", server.uri()));
}

#[tokio::test]
async fn test_single_url_ignores_chunk_size() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bucket/large.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"large\""))
        .expect(1)
        .mount(&server)
        .await;

    let signed = SignedUrlResponse {
        urls: vec![format!("{}/bucket/large.pdf?sig=abc", server.uri())],
        ..Default::default()
    };
    let storage = engine(4, 1);
    let size = 3 * storage.config().chunk_size_bytes() as usize + 17;
    let result = storage
        .upload(&signed, Arc::new(vec![3u8; size]), None)
        .await
        .expect("upload failed");

    assert_eq!(result.etag.as_deref(), Some("large"));
    assert!(result.parts.is_none());
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body.len(), size);
}

/// Answers part uploads after `delay`, recording when each request arrived.
struct SlowPart {
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for SlowPart {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .insert_header("ETag", "\"slow\"")
            .set_delay(self.delay)
    }
}

#[tokio::test]
async fn test_parts_in_flight_never_exceed_workers() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(300);
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("PUT"))
        .and(path("/bucket/manual.pdf"))
        .respond_with(SlowPart {
            delay,
            arrivals: arrivals.clone(),
        })
        .expect(6)
        .mount(&server)
        .await;
    mount_finalize(&server, "complete", 200, 1).await;
    mount_finalize(&server, "abort", 204, 0).await;

    let result = engine(4, 1)
        .upload(&signed_parts(&server, 6), Arc::new(vec![1u8; 5 * MIB + 10]), None)
        .await
        .expect("upload failed");
    assert_eq!(result.parts.map(|p| p.len()), Some(6));

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 6);
    // A worker only starts its next part once the previous response arrived,
    // so any five requests span at least one response delay.
    for window in arrivals.windows(5) {
        assert!(window[4] - window[0] >= delay * 9 / 10, "more than 4 parts in flight");
    }
    // The pool did run 4 parts at once.
    assert!(arrivals[3] - arrivals[0] < delay);
}

#[tokio::test]
async fn test_zero_workers_still_upload_every_part() {
    let server = MockServer::start().await;
    for part in 1..=3 {
        mount_part(&server, part, 200, 1).await;
    }
    mount_finalize(&server, "complete", 200, 1).await;
    mount_finalize(&server, "abort", 204, 0).await;

    let result = engine(0, 1)
        .upload(&signed_parts(&server, 3), Arc::new(vec![5u8; 2 * MIB + 5]), None)
        .await
        .expect("upload failed");

    let numbers: Vec<u32> = result.parts.unwrap().iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_parts_that_cannot_cover_the_file_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"x\""))
        .expect(0)
        .mount(&server)
        .await;
    mount_finalize(&server, "complete", 200, 0).await;

    let storage = BlobStorage::new(UploadConfig {
        chunk_size_mb: 0,
        workers: 2,
        max_attempts: 1,
        backoff: BackoffConfig::Fixed { delay_ms: 0 },
    });
    let err = storage
        .upload(&signed_parts(&server, 3), Arc::new(vec![5u8; 2 * MIB + 5]), None)
        .await
        .expect_err("expected the upload to be refused");
    assert!(matches!(err, ApiError::Domain(_)));
}

#[tokio::test]
async fn test_single_upload_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bucket/photo.png"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let signed = SignedUrlResponse {
        urls: vec![format!("{}/bucket/photo.png", server.uri())],
        ..Default::default()
    };
    let err = engine(4, 5)
        .upload(&signed, Arc::new(vec![9u8; 16]), None)
        .await
        .expect_err("expected a rejected upload");
    assert!(matches!(err, ApiError::SimpleUpload { .. }));
    assert_eq!(err.extra_args().unwrap()["rejected"], true);
}

#[tokio::test]
async fn test_blob_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/bucket/ok.pdf"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/bucket/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let storage = engine(1, 1);
    storage
        .delete(&format!("{}/bucket/ok.pdf", server.uri()))
        .await
        .expect("delete failed");
    let err = storage
        .delete(&format!("{}/bucket/gone.pdf", server.uri()))
        .await
        .expect_err("expected a failed delete");
    assert!(matches!(err, ApiError::BlobDelete { .. }));
}

#[tokio::test]
async fn test_signed_url_endpoints() {
    let (server, api) = common::setup_api_mock().await;
    let token = common::token(5, 3600, None);
    let bearer = token.authorization();
    let (session, _) = common::session_with(&api, Some(token)).await;

    Mock::given(method("POST"))
        .and(path("/instruments/bs-signed-url"))
        .and(header("authorization", bearer.as_str()))
        .and(body_json(serde_json::json!({"filename": "manual.pdf", "num_parts": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "upload_id": "up-1",
            "urls": ["u1", "u2", "u3"],
            "complete_url": "c",
            "abort_url": "a",
            "reserved_id": 41
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/instruments/41/bs-signed-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "display_url": "https://storage.test/manual.pdf?sig=1"
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/instruments/41/bs-signed-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "delete_url": "https://storage.test/manual.pdf?sig=2",
            "filename": "manual.pdf",
            "id": 41
        })))
        .mount(&server)
        .await;

    let signed_urls = ApiBlobStorage::new(api, Some(session));
    let request = SignedUrlRequest::for_upload("manual.pdf", 12 * MIB as u64, 5 * MIB as u64, None);
    let signed = signed_urls
        .post_signed_url(&request, "/instruments")
        .await
        .expect("post signed url failed");
    assert!(signed.is_multipart());
    assert_eq!(signed.reserved_id, Some(41));

    let display = signed_urls
        .get_signed_url(41, "/instruments")
        .await
        .expect("get signed url failed");
    assert!(display.ends_with("sig=1"));

    let delete = signed_urls
        .delete_signed_url(41, "/instruments")
        .await
        .expect("delete signed url failed");
    assert_eq!(delete.id, Some(41));
}
