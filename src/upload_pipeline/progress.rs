//! Per-run progress aggregation.
//!
//! One `ProgressTracker` owns the state of exactly one run. Transfers running
//! concurrently inside a window report into it in any order.

use crate::events::{ProgressBus, ProgressEventPayload};
use crate::logging::{log_warn, PIPELINE_COMPONENT};
use crate::upload_pipeline::types::{FileStatus, TransferOutcome, UploadSummary};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct RunState {
    statuses: Vec<FileStatus>,
    file_percent: Vec<u8>,
    outcomes: Vec<Option<TransferOutcome>>,
    completed: usize,
    failed: usize,
    /// Highest overall percentage surfaced so far
    reported_percent: u8,
}

impl RunState {
    fn summary(&self) -> UploadSummary {
        UploadSummary {
            completed: self.completed,
            failed: self.failed,
            total: self.statuses.len(),
        }
    }
}

pub struct ProgressTracker {
    container_id: String,
    bus: ProgressBus,
    state: Mutex<RunState>,
}

impl ProgressTracker {
    pub fn new(container_id: &str, total: usize, bus: ProgressBus) -> Self {
        Self {
            container_id: container_id.to_string(),
            bus,
            state: Mutex::new(RunState {
                statuses: vec![FileStatus::Pending; total],
                file_percent: vec![0; total],
                outcomes: vec![None; total],
                completed: 0,
                failed: 0,
                reported_percent: 0,
            }),
        }
    }

    // Each update is applied whole under the lock, so a poisoned state is still usable
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move file `index` to `status` with its own transfer `percent`.
    ///
    /// Returns false (and changes nothing) for unknown indices and for transitions
    /// that would regress the status.
    pub fn update(&self, index: usize, status: FileStatus, percent: u8) -> bool {
        let changed = {
            let mut state = self.lock();
            let Some(current) = state.statuses.get(index).copied() else {
                return false;
            };
            if !current.can_advance_to(status) {
                false
            } else {
                state.statuses[index] = status;
                state.file_percent[index] = if status.is_terminal() {
                    100
                } else {
                    percent.min(100)
                };
                match status {
                    FileStatus::Completed => state.completed += 1,
                    FileStatus::Failed => state.failed += 1,
                    _ => {}
                }
                true
            }
        };

        if changed {
            self.bus.publish(
                &self.container_id,
                ProgressEventPayload::FileStatusChanged { index, status },
            );
        }
        changed
    }

    pub fn mark_uploading(&self, index: usize) -> bool {
        self.update(index, FileStatus::Uploading, 0)
    }

    /// Record a terminal outcome. The first outcome for an index wins.
    pub fn record(&self, outcome: TransferOutcome) -> bool {
        let index = outcome.index;
        if !self.update(index, outcome.status, 100) {
            return false;
        }

        if let Some(reason) = &outcome.error_reason {
            log_warn(
                PIPELINE_COMPONENT,
                &format!("File #{} failed: {}", index, reason),
            )
            .unwrap_or_default();
        }
        self.lock().outcomes[index] = Some(outcome);
        true
    }

    pub fn status(&self, index: usize) -> Option<FileStatus> {
        self.lock().statuses.get(index).copied()
    }

    pub fn file_percent(&self, index: usize) -> Option<u8> {
        self.lock().file_percent.get(index).copied()
    }

    pub fn summary(&self) -> UploadSummary {
        self.lock().summary()
    }

    /// Overall percentage; never lower than what was already surfaced
    pub fn percent(&self) -> u8 {
        let state = self.lock();
        state.summary().percent().max(state.reported_percent)
    }

    pub fn status_line(&self) -> String {
        let summary = self.summary();
        let mut line = format!(
            "Uploaded {} of {} files",
            summary.completed + summary.failed,
            summary.total
        );
        if summary.failed > 0 {
            line.push_str(&format!(" ({} failed)", summary.failed));
        }
        line
    }

    /// Surface the aggregate after a window or relay batch has settled.
    pub fn emit_window_settled(&self) -> u8 {
        let (summary, percent) = {
            let mut state = self.lock();
            let summary = state.summary();
            let percent = summary.percent().max(state.reported_percent);
            state.reported_percent = percent;
            (summary, percent)
        };

        self.bus.publish(
            &self.container_id,
            ProgressEventPayload::WindowSettled {
                summary,
                percent,
                status_line: self.status_line(),
            },
        );
        percent
    }

    /// Outcomes sorted by index; indices that never settled are failed with `reason`.
    pub fn finish(&self, reason: &str) -> Vec<TransferOutcome> {
        let missing: Vec<usize> = {
            let state = self.lock();
            state
                .outcomes
                .iter()
                .enumerate()
                .filter(|(_, o)| o.is_none())
                .map(|(i, _)| i)
                .collect()
        };
        for index in missing {
            self.record(TransferOutcome::failed(index, reason));
        }

        self.lock().outcomes.iter().flatten().cloned().collect()
    }
}
