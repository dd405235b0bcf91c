// Module declarations
pub mod backend;
pub mod compression;
mod notifier;
mod progress;
mod scheduler;
pub mod strategy;
pub mod transfer;
mod types;

// Re-export types and constants from submodules
pub use types::*;

pub use backend::{HttpBackend, StudioBackend};
pub use notifier::{outcome_message, CompletionNotifier};
pub use progress::ProgressTracker;
pub use scheduler::{BatchScheduler, CANCELLED_REASON};
pub use transfer::{classify_error, ErrorType};

use crate::config::UploadTunables;
use crate::error::UploadError;
use crate::events::{ProgressBus, ProgressEventPayload, ProgressReceiver};
use crate::logging::{log_error, log_info, PIPELINE_COMPONENT};
use compression::Compressor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use transfer::{direct, relay, TransferContext};
use uuid::Uuid;

const NOT_ATTEMPTED_REASON: &str = "not attempted";

/// Drives one upload run from raw files to a final report.
#[derive(Clone)]
pub struct UploadOrchestrator {
    backend: Arc<dyn StudioBackend>,
    tunables: UploadTunables,
    bus: ProgressBus,
    cancel: CancellationToken,
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("backend", &"<studio backend>")
            .field("tunables", &self.tunables)
            .field("bus", &self.bus)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl UploadOrchestrator {
    pub fn new(backend: Arc<dyn StudioBackend>, tunables: UploadTunables) -> Self {
        Self {
            backend,
            tunables,
            bus: ProgressBus::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_bus(mut self, bus: ProgressBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn tunables(&self) -> &UploadTunables {
        &self.tunables
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.bus.subscribe()
    }

    /// Token checked at every window boundary. Cancelling it fails the files not
    /// yet started; windows already in flight still settle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Compress, partition and transfer every file in `request`.
    ///
    /// Per-file and per-batch failures end up in the report. The only run-level
    /// error besides invalid input is [`UploadError::BackendUnreachable`]: files
    /// were attempted, none completed and every failure was a connection failure.
    pub async fn run(&self, request: UploadRequest) -> Result<UploadReport, UploadError> {
        self.tunables.validate()?;
        if request.container_id().trim().is_empty() {
            return Err(UploadError::Validation(
                "Container id must not be empty".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let container_id = request.container_id();
        let category = request.category();
        let total = request.len();

        log_info(
            PIPELINE_COMPONENT,
            &format!(
                "Run {} started: {} files for {} ({})",
                run_id, total, container_id, category
            ),
        )
        .unwrap_or_default();
        self.bus
            .publish(container_id, ProgressEventPayload::RunStarted { total });

        let tracker = ProgressTracker::new(container_id, total, self.bus.clone());
        let compressor = Compressor::for_files(self.tunables.compression.clone(), request.files());

        let (candidates, relayed) =
            strategy::presort(request.pending(), self.tunables.relay_threshold_bytes);
        log_info(
            PIPELINE_COMPONENT,
            &format!(
                "Run {}: {} direct candidates, {} relayed",
                run_id,
                candidates.len(),
                relayed.len()
            ),
        )
        .unwrap_or_default();

        let ctx = TransferContext {
            backend: self.backend.as_ref(),
            container_id,
            category,
            tracker: &tracker,
        };
        let compressor = &compressor;
        let attempted = AtomicUsize::new(0);
        let attempted_ref = &attempted;

        BatchScheduler::new(self.tunables.concurrency_width, self.cancel.clone())
            .drain("direct", candidates, &tracker, move |window| {
                self.transfer_window(ctx, compressor, window, attempted_ref)
            })
            .await;

        BatchScheduler::new(self.tunables.relay_batch_size, self.cancel.clone())
            .drain("relay", relayed, &tracker, move |batch| {
                self.transfer_window(ctx, compressor, batch, attempted_ref)
            })
            .await;

        let attempted = attempted.into_inner();
        let outcomes = tracker.finish(NOT_ATTEMPTED_REASON);
        let summary = tracker.summary();

        let network_failures = outcomes
            .iter()
            .filter(|o| o.error_type == Some(ErrorType::Network))
            .count();
        let unreachable = attempted > 0 && summary.completed == 0 && network_failures == attempted;

        let report = CompletionNotifier::new(self.backend.as_ref(), &self.bus)
            .finalize(run_id, container_id, category, summary, outcomes)
            .await;

        if unreachable {
            log_error(
                PIPELINE_COMPONENT,
                &format!(
                    "Run {}: backend unreachable, all {} attempted uploads failed to connect",
                    run_id, attempted
                ),
            )
            .unwrap_or_default();
            return Err(UploadError::BackendUnreachable { attempted });
        }

        Ok(report)
    }

    /// Stage one window and hand it to the agents. Staged files are partitioned
    /// again by their final size, so a file that compression brought down to the
    /// relay threshold is relayed from here.
    async fn transfer_window(
        &self,
        ctx: TransferContext<'_>,
        compressor: &Compressor,
        window: Vec<PendingFile<'_>>,
        attempted: &AtomicUsize,
    ) -> Vec<TransferOutcome> {
        let staged = self.stage_window(compressor, window, ctx.tracker).await;
        attempted.fetch_add(staged.len(), Ordering::Relaxed);

        let plan = strategy::partition(staged, self.tunables.relay_threshold_bytes);
        let mut outcomes = Vec::with_capacity(plan.len());
        if !plan.direct.is_empty() {
            outcomes.extend(direct::transfer_window(ctx, plan.direct).await);
        }

        let batch_size = self.tunables.relay_batch_size.max(1);
        let mut relayed = plan.relayed.into_iter().peekable();
        while relayed.peek().is_some() {
            let batch: Vec<StagedFile> = relayed.by_ref().take(batch_size).collect();
            outcomes.extend(relay::transfer_batch(ctx, batch).await);
        }
        outcomes
    }

    /// Load and compress a window's files, yielding between files. Unreadable and
    /// oversized files are failed here and never reach the network.
    async fn stage_window(
        &self,
        compressor: &Compressor,
        window: Vec<PendingFile<'_>>,
        tracker: &ProgressTracker,
    ) -> Vec<StagedFile> {
        let max_bytes = self.tunables.max_file_bytes;
        let mut staged = Vec::with_capacity(window.len());

        for PendingFile { index, file } in window {
            // Passthrough keeps the size, so these are rejected without reading them
            if !compressor.is_eligible(file) && file.size() > max_bytes {
                tracker.record(oversize(index, &file.name, file.size(), max_bytes));
                continue;
            }

            let data = match file.load().await {
                Ok(data) => data,
                Err(e) => {
                    tracker.record(TransferOutcome::failed(
                        index,
                        format!("failed to read {}: {}", file.name, e),
                    ));
                    continue;
                }
            };

            let staged_file = compressor.compress(index, file, data);
            if staged_file.byte_size > max_bytes {
                tracker.record(oversize(
                    index,
                    &staged_file.original_name,
                    staged_file.byte_size,
                    max_bytes,
                ));
            } else {
                staged.push(staged_file);
            }
            tokio::task::yield_now().await;
        }

        staged
    }
}

fn oversize(index: usize, name: &str, size: u64, max_bytes: u64) -> TransferOutcome {
    TransferOutcome::failed(
        index,
        format!("{} is {} bytes, above the {} byte limit", name, size, max_bytes),
    )
}
