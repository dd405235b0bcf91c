//! Transfer agents.
//!
//! - [`direct`]: authorize, write straight to storage, then register the window
//! - [`multipart`]: per-file server handle path used when authorization is down
//! - [`relay`]: small files posted through the application server in batches

pub mod classify;
pub mod direct;
pub mod multipart;
pub mod relay;

pub use classify::{classify_error, ErrorType};

use crate::upload_pipeline::backend::StudioBackend;
use crate::upload_pipeline::progress::ProgressTracker;

/// What every agent needs to move one window of files
#[derive(Clone, Copy)]
pub struct TransferContext<'a> {
    pub backend: &'a dyn StudioBackend,
    pub container_id: &'a str,
    pub category: &'a str,
    pub tracker: &'a ProgressTracker,
}
