//! Run completion: summary message, listing refresh and the final event.

use crate::events::{ProgressBus, ProgressEventPayload};
use crate::logging::{log_warn, log_with_details, PIPELINE_COMPONENT};
use crate::upload_pipeline::backend::StudioBackend;
use crate::upload_pipeline::types::{RemoteFile, TransferOutcome, UploadReport, UploadSummary};
use serde_json::json;
use uuid::Uuid;

/// Single human-readable message for the end of a run
pub fn outcome_message(summary: &UploadSummary) -> String {
    match (summary.completed, summary.failed, summary.total) {
        (_, _, 0) => "No files to upload".to_string(),
        (completed, 0, total) if completed == total => {
            format!("All {} files uploaded successfully", total)
        }
        (0, failed, total) if failed == total => format!("All {} uploads failed", total),
        (completed, failed, total) => format!(
            "Uploaded {} of {} files ({} failed)",
            completed, total, failed
        ),
    }
}

pub struct CompletionNotifier<'a> {
    backend: &'a dyn StudioBackend,
    bus: &'a ProgressBus,
}

impl<'a> CompletionNotifier<'a> {
    pub fn new(backend: &'a dyn StudioBackend, bus: &'a ProgressBus) -> Self {
        Self { backend, bus }
    }

    /// Build the report, refresh the container listing and publish `RunFinished`.
    ///
    /// Failed files are reported, never retried here.
    pub async fn finalize(
        &self,
        run_id: Uuid,
        container_id: &str,
        category: &str,
        summary: UploadSummary,
        outcomes: Vec<TransferOutcome>,
    ) -> UploadReport {
        let message = outcome_message(&summary);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.is_completed())
            .map(|o| json!({ "index": o.index, "reason": o.error_reason }))
            .collect();
        log_with_details(
            PIPELINE_COMPONENT,
            if summary.failed > 0 { "WARN" } else { "INFO" },
            &format!("Run {}: {}", run_id, message),
            json!({
                "containerId": container_id,
                "completed": summary.completed,
                "failed": summary.failed,
                "total": summary.total,
                "failures": failed,
            }),
        )
        .unwrap_or_default();

        let listing = self.refresh_listing(container_id, category).await;

        self.bus.publish(
            container_id,
            ProgressEventPayload::RunFinished {
                summary,
                message: message.clone(),
            },
        );

        UploadReport {
            run_id,
            container_id: container_id.to_string(),
            category: category.to_string(),
            summary,
            outcomes,
            message,
            listing,
        }
    }

    async fn refresh_listing(&self, container_id: &str, category: &str) -> Vec<RemoteFile> {
        match self.backend.list_files(container_id, category).await {
            Ok(files) => files,
            Err(e) => {
                log_warn(
                    PIPELINE_COMPONENT,
                    &format!("Failed to refresh file listing for {}: {}", container_id, e),
                )
                .unwrap_or_default();
                Vec::new()
            }
        }
    }
}
