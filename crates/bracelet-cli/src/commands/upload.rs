//! Upload command - Send an instrument manual to blob storage
//!
//! Provides the `bracelet upload` CLI command which:
//! 1. Requests signed URLs for a new instrument (or for an existing one
//!    with `--replace`)
//! 2. Transfers the file, in parallel parts when it exceeds the chunk size
//! 3. Prints the reserved instrument id and the stored blob URL

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use bracelet_api::blob::{BlobStorage, ProgressFn};
use bracelet_api::controller::InstrumentsController;
use clap::Args;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// File to upload
    pub path: PathBuf,

    /// Name stored with the blob; defaults to the file name
    #[arg(long)]
    pub name: Option<String>,

    /// Replace the manual of an existing instrument
    #[arg(long, value_name = "ID")]
    pub replace: Option<i64>,
}

impl UploadCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);

        let filename = match &self.name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("No file name in {}", self.path.display()))?,
        };
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let size = data.len() as u64;
        info!(filename = %filename, size, "Starting upload");

        let instruments = InstrumentsController::new(
            ctx.api.clone(),
            Some(ctx.session.clone()),
            BlobStorage::new(ctx.config.upload.clone()),
        );
        let progress = progress_logger();
        let data = Arc::new(data);

        let (reserved_id, result) = match self.replace {
            Some(id) => {
                let result = instruments
                    .replace_file(id, &filename, data, Some(progress))
                    .await?;
                (Some(id), result)
            }
            None => {
                let (signed, result) = instruments
                    .upload_file(&filename, data, Some(progress))
                    .await?;
                (signed.reserved_id, result)
            }
        };

        let parts = result.parts.as_ref().map(Vec::len);
        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "instrument_id": reserved_id,
                "filename": filename,
                "size": size,
                "blob_url": result.blob_url,
                "parts": parts,
                "etag": result.etag,
            }));
        } else {
            fmt.success(&format!("Uploaded {filename} ({size} bytes)"));
            if let Some(id) = reserved_id {
                fmt.info(&format!("Instrument: {id}"));
            }
            fmt.info(&format!("Blob:       {}", result.blob_url));
            if let Some(parts) = parts {
                fmt.info(&format!("Parts:      {parts}"));
            }
        }
        Ok(())
    }
}

/// Logs every completed tenth of the transfer.
fn progress_logger() -> ProgressFn {
    let last_decile = Arc::new(AtomicU64::new(0));
    Arc::new(move |sent: u64, total: u64| {
        if total == 0 {
            return;
        }
        let decile = sent.saturating_mul(10) / total;
        if last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            info!(sent, total, percent = decile * 10, "Upload progress");
        }
    })
}
