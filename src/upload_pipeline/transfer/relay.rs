//! Server-relayed transfer of small files, one form request per batch.

use super::classify::{classify_error, ErrorType};
use super::TransferContext;
use crate::logging::{log_info, PIPELINE_COMPONENT};
use crate::upload_pipeline::types::{StagedFile, TransferOutcome};

/// Post one batch. The relay endpoint reports only a count, so the batch
/// succeeds or fails as a whole.
pub async fn transfer_batch(ctx: TransferContext<'_>, batch: Vec<StagedFile>) -> Vec<TransferOutcome> {
    for file in &batch {
        ctx.tracker.mark_uploading(file.index);
    }

    let failure = match ctx
        .backend
        .relay_batch(ctx.container_id, ctx.category, &batch)
        .await
    {
        Ok(response) if response.uploaded_count >= batch.len() => None,
        Ok(response) => Some((
            format!(
                "relay batch incomplete: server stored {} of {} files",
                response.uploaded_count,
                batch.len()
            ),
            ErrorType::Server,
        )),
        Err(e) => Some((format!("relay batch failed: {}", e), classify_error(&e))),
    };

    match failure {
        None => {
            log_info(
                PIPELINE_COMPONENT,
                &format!("Relayed batch of {} files", batch.len()),
            )
            .unwrap_or_default();
            batch
                .iter()
                .map(|f| TransferOutcome::completed(f.index, None))
                .collect()
        }
        Some((reason, error_type)) => batch
            .iter()
            .map(|f| TransferOutcome::failed_with(f.index, reason.clone(), error_type))
            .collect(),
    }
}
