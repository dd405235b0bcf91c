//! Windowed draining of a transfer partition.
//!
//! Files are taken `width` at a time. A window is handed to its runner, which
//! loads, stages and transfers it and returns once every file in it has settled;
//! only then does the next window start.

use crate::logging::{log_debug, log_info, PIPELINE_COMPONENT};
use crate::upload_pipeline::progress::ProgressTracker;
use crate::upload_pipeline::types::{PendingFile, TransferOutcome};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub const CANCELLED_REASON: &str = "cancelled";
const MISSING_OUTCOME_REASON: &str = "transfer reported no outcome";

pub struct BatchScheduler {
    width: usize,
    cancel: CancellationToken,
}

impl BatchScheduler {
    pub fn new(width: usize, cancel: CancellationToken) -> Self {
        Self {
            width: width.max(1),
            cancel,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Drain `files` window by window through `run_window`.
    ///
    /// Every outcome is recorded in `tracker` and a progress update is emitted after
    /// each window. Returns the number of windows started.
    pub async fn drain<'a, F, Fut>(
        &self,
        label: &str,
        files: Vec<PendingFile<'a>>,
        tracker: &ProgressTracker,
        mut run_window: F,
    ) -> usize
    where
        F: FnMut(Vec<PendingFile<'a>>) -> Fut,
        Fut: Future<Output = Vec<TransferOutcome>>,
    {
        let total = files.len();
        let mut remaining = files.into_iter().peekable();
        let mut windows = 0;

        while remaining.peek().is_some() {
            if self.cancel.is_cancelled() {
                let skipped: Vec<PendingFile<'a>> = remaining.by_ref().collect();
                log_info(
                    PIPELINE_COMPONENT,
                    &format!(
                        "Cancellation observed, skipping {} remaining {} files",
                        skipped.len(),
                        label
                    ),
                )
                .unwrap_or_default();
                for file in &skipped {
                    tracker.record(TransferOutcome::failed(file.index, CANCELLED_REASON));
                }
                tracker.emit_window_settled();
                break;
            }

            let window: Vec<PendingFile<'a>> = remaining.by_ref().take(self.width).collect();
            let indices: Vec<usize> = window.iter().map(|f| f.index).collect();
            windows += 1;

            log_debug(
                PIPELINE_COMPONENT,
                &format!(
                    "Starting {} window {} with {} of {} files",
                    label,
                    windows,
                    indices.len(),
                    total
                ),
            )
            .unwrap_or_default();

            for outcome in run_window(window).await {
                tracker.record(outcome);
            }

            // Anything the agent forgot to report still settles within its window
            for index in indices {
                if tracker.status(index).is_some_and(|s| !s.is_terminal()) {
                    tracker.record(TransferOutcome::failed(index, MISSING_OUTCOME_REASON));
                }
            }

            let percent = tracker.emit_window_settled();
            log_debug(
                PIPELINE_COMPONENT,
                &format!("{} window {} settled, {}% overall", label, windows, percent),
            )
            .unwrap_or_default();
        }

        windows
    }
}
