use crate::upload_pipeline::{FileStatus, UploadSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Progress notification for one upload run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub container_id: String,
    pub payload: ProgressEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventPayload {
    /// Run accepted, every file pending
    RunStarted { total: usize },

    /// One file moved to a new status
    FileStatusChanged { index: usize, status: FileStatus },

    /// A concurrency window or relay batch fully settled
    WindowSettled {
        summary: UploadSummary,
        percent: u8,
        status_line: String,
    },

    /// All partitions drained and bookkeeping finalized
    RunFinished {
        summary: UploadSummary,
        message: String,
    },
}

impl ProgressEvent {
    pub fn payload_type(&self) -> &str {
        match &self.payload {
            ProgressEventPayload::RunStarted { .. } => "run_started",
            ProgressEventPayload::FileStatusChanged { .. } => "file_status_changed",
            ProgressEventPayload::WindowSettled { .. } => "window_settled",
            ProgressEventPayload::RunFinished { .. } => "run_finished",
        }
    }

    /// Overall percentage carried by the event, if any
    pub fn percent(&self) -> Option<u8> {
        match &self.payload {
            ProgressEventPayload::WindowSettled { percent, .. } => Some(*percent),
            ProgressEventPayload::RunFinished { summary, .. } => Some(summary.percent()),
            _ => None,
        }
    }
}
