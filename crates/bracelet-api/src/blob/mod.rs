//! Blob storage
//!
//! - [`signed_url`] - API endpoints issuing signed storage URLs
//! - [`upload`] - Single-shot and multipart transfer engine

pub mod signed_url;
pub mod upload;

pub use signed_url::{
    num_parts, ApiBlobStorage, BlobFileRef, DeleteSignedUrl, SignedUrlRequest, SignedUrlResponse,
};
pub use upload::{
    blob_parts, parts_to_xml, BlobStorage, BlobUploadTask, CompletedPart, ProgressFn, UploadResult,
};
