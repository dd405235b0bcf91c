mod bus;
mod types;

pub use bus::{ProgressBus, ProgressReceiver};
pub use types::{EventSequence, ProgressEvent, ProgressEventPayload};
