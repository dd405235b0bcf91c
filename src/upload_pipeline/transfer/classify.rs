//! Failure classification for backend errors.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Client errors (400-499), the request itself was refused
    Client,
    /// Server errors (500-599) and malformed or negative responses
    Server,
    /// Connection issues, nothing reached the backend
    Network,
}

/// Classify a backend failure into an ErrorType
pub fn classify_error(error: &BackendError) -> ErrorType {
    match error {
        BackendError::Http { status, .. } if (400..500).contains(status) => ErrorType::Client,
        BackendError::Http { .. } => ErrorType::Server,
        BackendError::Transport(_) => ErrorType::Network,
        BackendError::Decode(_) | BackendError::Rejected(_) => ErrorType::Server,
    }
}
