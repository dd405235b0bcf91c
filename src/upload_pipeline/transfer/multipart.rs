//! Per-file multipart relay, used when direct authorization is unavailable.
//!
//! Slower than the direct path: files go one at a time, each through a
//! server-assigned upload handle.

use super::classify::{classify_error, ErrorType};
use super::TransferContext;
use crate::logging::{log_info, PIPELINE_COMPONENT};
use crate::upload_pipeline::backend::MultipartCreateRequest;
use crate::upload_pipeline::types::{StagedFile, TransferOutcome};

/// Send every file through its own multipart handle, sequentially.
pub async fn transfer_sequential(
    ctx: TransferContext<'_>,
    files: Vec<StagedFile>,
) -> Vec<TransferOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in &files {
        ctx.tracker.mark_uploading(file.index);
        outcomes.push(transfer_one(ctx, file).await);
    }

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    log_info(
        PIPELINE_COMPONENT,
        &format!(
            "Multipart fallback finished: {} of {} files uploaded",
            completed,
            files.len()
        ),
    )
    .unwrap_or_default();
    outcomes
}

async fn transfer_one(ctx: TransferContext<'_>, file: &StagedFile) -> TransferOutcome {
    let request = MultipartCreateRequest {
        filename: file.file_name.clone(),
        size: file.byte_size,
        content_type: file.mime_type.clone(),
        session_id: ctx.container_id.to_string(),
        category: ctx.category.to_string(),
    };

    let handle = match ctx.backend.create_multipart(&request).await {
        Ok(handle) => handle,
        Err(e) => {
            return TransferOutcome::failed_with(
                file.index,
                format!("multipart create failed: {}", e),
                classify_error(&e),
            )
        }
    };

    match ctx.backend.send_multipart(&handle, file).await {
        Ok(response) if response.success => {
            let locator = response
                .path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| format!("uploads/{}", handle.upload_id));
            TransferOutcome::completed(file.index, Some(locator))
        }
        Ok(_) => TransferOutcome::failed_with(
            file.index,
            format!("multipart upload {} rejected by server", handle.upload_id),
            ErrorType::Server,
        ),
        Err(e) => TransferOutcome::failed_with(
            file.index,
            format!("multipart send failed: {}", e),
            classify_error(&e),
        ),
    }
}
