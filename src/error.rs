use thiserror::Error;

/// Studio uploader errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// Configuration file or tunable errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (path, size, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend request errors that escaped per-file handling
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Every attempted transfer failed at the transport level
    #[error("Backend unreachable: all {attempted} attempted uploads failed to connect")]
    BackendUnreachable { attempted: usize },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Failure of one request against the studio backend or the storage endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Non-success HTTP status
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, DNS or timeout failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Successful status but the body reported a negative result
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            BackendError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

impl From<UploadError> for String {
    fn from(err: UploadError) -> String {
        err.to_string()
    }
}

impl From<Box<dyn std::error::Error>> for UploadError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        UploadError::Other(err.to_string())
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, UploadError>;
}

impl<T, E: Into<UploadError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, UploadError> {
        self.map_err(|e| {
            let err: UploadError = e.into();
            match err {
                UploadError::Other(s) => UploadError::Other(format!("{}: {}", msg, s)),
                UploadError::Config(s) => UploadError::Config(format!("{}: {}", msg, s)),
                UploadError::Validation(s) => UploadError::Validation(format!("{}: {}", msg, s)),
                other => other,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploadError::Validation("Invalid path".to_string());
        assert_eq!(err.to_string(), "Validation error: Invalid path");
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = UploadError::Config("Missing API key".to_string());
        let s: String = err.into();
        assert_eq!(s, "Configuration error: Missing API key");
    }

    #[test]
    fn test_error_context() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let result = result.context("Failed to read config file");

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("I/O error"));
    }

    #[test]
    fn test_context_prefixes_validation_message() {
        let result: Result<(), UploadError> = Err(UploadError::Validation("too big".to_string()));
        let err = result.context("photo.cr2").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: photo.cr2: too big");
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Http {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "request failed with status 500: boom");

        let upload: UploadError = err.into();
        assert!(upload.to_string().starts_with("Backend error:"));
    }
}
