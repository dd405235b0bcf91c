use super::types::{EventSequence, ProgressEvent, ProgressEventPayload};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub type ProgressReceiver = broadcast::Receiver<ProgressEvent>;
type ProgressSender = broadcast::Sender<ProgressEvent>;

/// Event bus for distributing upload progress
#[derive(Clone, Debug)]
pub struct ProgressBus {
    sender: ProgressSender,
    sequence: Arc<AtomicU64>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event (returns sequence number).
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, container_id: &str, payload: ProgressEventPayload) -> EventSequence {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = ProgressEvent {
            sequence,
            timestamp: Utc::now(),
            container_id: container_id.to_string(),
            payload,
        };

        let _ = self.sender.send(event);
        sequence
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> EventSequence {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
