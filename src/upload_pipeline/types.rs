//! Type definitions for the upload pipeline.
//!
//! Defines the run data model (request, staged files, plan, outcomes, summary) and
//! the default tunables.

use crate::error::UploadError;
use crate::upload_pipeline::transfer::ErrorType;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

// Files at or below this size skip storage authorization and go through the relay
pub const DEFAULT_RELAY_THRESHOLD_BYTES: u64 = 512 * 1024;

// Maximum number of simultaneous direct transfers
pub const DEFAULT_CONCURRENCY_WIDTH: usize = 8;

// Files per relay form request
pub const DEFAULT_RELAY_BATCH_SIZE: usize = 10;

pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

pub const DEFAULT_SMALL_FILE_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;
pub const DEFAULT_BASE_QUALITY: u8 = 85;
pub const DEFAULT_LARGE_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_LARGE_FILE_QUALITY: u8 = 80;
pub const DEFAULT_HUGE_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_HUGE_FILE_QUALITY: u8 = 70;

/// Camera RAW extensions that are always uploaded byte-for-byte
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "cr3", "crw", "dcr", "dng", "erf", "iiq", "kdc", "mef", "mos", "mrw",
    "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];

// Bytes read from a path-backed file to sniff its content type
const SNIFF_HEADER_BYTES: u64 = 8192;

pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Where a raw file's bytes live until its window loads them
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    Path(PathBuf),
}

/// One caller-supplied file, before compression.
///
/// Path-backed files are only read when their window is staged, so a run never
/// holds more than one window of payloads.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    size: u64,
    source: FileSource,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// File on disk whose size and type are already known
    pub fn from_path(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        path: impl Into<PathBuf>,
        size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            source: FileSource::Path(path.into()),
        }
    }

    /// Describe a file on disk from its metadata and the first few KB of content.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let read_error =
            |e: std::io::Error| UploadError::Other(format!("Failed to read {}: {}", path.display(), e));
        let size = tokio::fs::metadata(path).await.map_err(read_error)?.len();

        let mut header = Vec::new();
        tokio::fs::File::open(path)
            .await
            .map_err(read_error)?
            .take(SNIFF_HEADER_BYTES)
            .read_to_end(&mut header)
            .await
            .map_err(read_error)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = infer::get(&header)
            .map(|kind| kind.mime_type())
            .unwrap_or(FALLBACK_MIME);

        Ok(Self::from_path(name, mime_type, path, size))
    }

    /// Declared size; for path-backed files this is the size seen at `open`
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read the file's bytes. In-memory files are shared, not copied.
    pub async fn load(&self) -> std::io::Result<Bytes> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.clone()),
            FileSource::Path(path) => Ok(tokio::fs::read(path).await?.into()),
        }
    }

    /// Lowercased extension without the dot, if any
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name)
    }

    pub fn is_raw(&self) -> bool {
        self.extension()
            .map(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

pub(crate) fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Files to upload into one container. Immutable once built.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    container_id: String,
    category: String,
    files: Vec<RawFile>,
}

impl UploadRequest {
    pub fn new(container_id: impl Into<String>, category: impl Into<String>, files: Vec<RawFile>) -> Self {
        Self {
            container_id: container_id.into(),
            category: category.into(),
            files,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn files(&self) -> &[RawFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A request file waiting for its window
#[derive(Debug, Clone, Copy)]
pub struct PendingFile<'a> {
    /// Position in the original request
    pub index: usize,
    pub file: &'a RawFile,
}

impl UploadRequest {
    /// Every file paired with its request index
    pub fn pending(&self) -> Vec<PendingFile<'_>> {
        self.files
            .iter()
            .enumerate()
            .map(|(index, file)| PendingFile { index, file })
            .collect()
    }
}

/// A file after compression, ready for transfer
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub original_name: String,
    /// Name sent to the backend; differs from `original_name` when re-encoded
    pub file_name: String,
    pub byte_size: u64,
    pub mime_type: String,
    pub payload: Bytes,
    /// Position in the original request
    pub index: usize,
}

impl StagedFile {
    /// Stage a file without modification
    pub fn passthrough(index: usize, file: &RawFile, data: Bytes) -> Self {
        Self {
            original_name: file.name.clone(),
            file_name: file.name.clone(),
            byte_size: data.len() as u64,
            mime_type: file.mime_type.clone(),
            payload: data,
            index,
        }
    }
}

/// Partition of one run's staged files by transfer strategy
#[derive(Debug, Default)]
pub struct TransferPlan {
    pub direct: Vec<StagedFile>,
    pub relayed: Vec<StagedFile>,
}

impl TransferPlan {
    pub fn len(&self) -> usize {
        self.direct.len() + self.relayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.relayed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl FileStatus {
    fn rank(self) -> u8 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Uploading => 1,
            FileStatus::Completed | FileStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` keeps the status monotonic
    pub fn can_advance_to(self, next: FileStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Final result for one staged file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub index: usize,
    pub status: FileStatus,
    pub remote_locator: Option<String>,
    pub error_reason: Option<String>,
    /// Classification of the failure, when it came from a backend call
    #[serde(skip)]
    pub error_type: Option<ErrorType>,
}

impl TransferOutcome {
    pub fn completed(index: usize, remote_locator: Option<String>) -> Self {
        Self {
            index,
            status: FileStatus::Completed,
            remote_locator,
            error_reason: None,
            error_type: None,
        }
    }

    /// Failure that never reached the backend (oversize, cancelled, ...)
    pub fn failed(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            status: FileStatus::Failed,
            remote_locator: None,
            error_reason: Some(reason.into()),
            error_type: None,
        }
    }

    pub fn failed_with(index: usize, reason: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            error_type: Some(error_type),
            ..Self::failed(index, reason)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FileStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl UploadSummary {
    /// round(100 * (completed + failed) / total); an empty run is 100%
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let settled = (self.completed + self.failed) as f64;
        ((100.0 * settled / self.total as f64).round() as u8).min(100)
    }

    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// Entry in a container's remote file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    #[serde(alias = "filename")]
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Everything a caller learns from one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub run_id: Uuid,
    pub container_id: String,
    pub category: String,
    pub summary: UploadSummary,
    /// One outcome per request index, sorted by index
    pub outcomes: Vec<TransferOutcome>,
    pub message: String,
    /// Container listing fetched after the run; empty when the refresh failed
    pub listing: Vec<RemoteFile>,
}

impl UploadReport {
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.is_completed())
    }
}
