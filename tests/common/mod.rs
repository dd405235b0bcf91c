#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use studio_uploader::error::BackendError;
use studio_uploader::upload_pipeline::backend::{
    DirectAuthorization, FileDescriptor, MultipartCreateRequest, MultipartHandle,
    MultipartSendResponse, RegistrationResponse, RelayBatchResponse, StudioBackend, WriteGrant,
};
use studio_uploader::upload_pipeline::{RawFile, RemoteFile, StagedFile};

/// Scripted failures for [`MockBackend`]
#[derive(Debug, Default, Clone)]
pub struct MockBehavior {
    /// Every call fails with a transport error
    pub unreachable: bool,
    pub authorize_error: Option<BackendError>,
    /// Filenames that get a per-item authorization error
    pub refused_authorizations: HashSet<String>,
    /// Filenames whose storage write fails
    pub failing_writes: HashSet<String>,
    pub register_error: Option<BackendError>,
    pub register_rejects: bool,
    pub create_multipart_error: Option<BackendError>,
    /// Filenames whose multipart send fails
    pub failing_multipart_sends: HashSet<String>,
    /// 1-based relay batch numbers that fail
    pub failing_relay_batches: HashSet<usize>,
    /// Subtracted from every relay batch's uploaded count
    pub relay_shortfall: usize,
    pub list_error: Option<BackendError>,
    /// Removed from disk when the first direct write starts
    pub delete_on_first_write: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Authorize(Vec<String>),
    Write(String),
    Register(Vec<String>),
    CreateMultipart(String),
    SendMultipart(String),
    RelayBatch(Vec<String>),
    List,
}

/// In-memory backend that records calls and tracks concurrent direct writes
#[derive(Default)]
pub struct MockBackend {
    behavior: MockBehavior,
    calls: Mutex<Vec<RecordedCall>>,
    stored: Mutex<Vec<RemoteFile>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    relay_batches: AtomicUsize,
    multipart_ids: AtomicUsize,
    multipart_names: Mutex<HashMap<String, String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn stored_names(&self) -> Vec<String> {
        self.stored.lock().unwrap().iter().map(|f| f.name.clone()).collect()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.behavior.unreachable {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn store(&self, name: &str, size: u64, category: &str) {
        self.stored.lock().unwrap().push(RemoteFile {
            name: name.to_string(),
            size: Some(size),
            url: None,
            category: Some(category.to_string()),
        });
    }
}

#[async_trait]
impl StudioBackend for MockBackend {
    async fn authorize_direct(
        &self,
        container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<Vec<DirectAuthorization>, BackendError> {
        self.record(RecordedCall::Authorize(
            files.iter().map(|f| f.filename.clone()).collect(),
        ));
        self.check_reachable()?;
        if let Some(e) = &self.behavior.authorize_error {
            return Err(e.clone());
        }

        Ok(files
            .iter()
            .map(|f| {
                if self.behavior.refused_authorizations.contains(&f.filename) {
                    DirectAuthorization {
                        filename: f.filename.clone(),
                        error: Some("quota exceeded".to_string()),
                        ..Default::default()
                    }
                } else {
                    DirectAuthorization {
                        filename: f.filename.clone(),
                        write_url: Some(format!(
                            "https://storage.test/sessions/{}/{}?X-Signature=abc",
                            container_id, f.filename
                        )),
                        content_type: Some("image/jpeg".to_string()),
                        key: None,
                        error: None,
                    }
                }
            })
            .collect())
    }

    async fn write_direct(&self, grant: &WriteGrant, file: &StagedFile) -> Result<(), BackendError> {
        self.record(RecordedCall::Write(file.file_name.clone()));
        if let Some(path) = &self.behavior.delete_on_first_write {
            let _ = std::fs::remove_file(path);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        // Let sibling writes in the same window start before this one ends
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.check_reachable()?;
        if self.behavior.failing_writes.contains(&grant.filename) {
            return Err(BackendError::Http {
                status: 503,
                body: "storage unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn register_uploads(
        &self,
        _container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<RegistrationResponse, BackendError> {
        self.record(RecordedCall::Register(
            files.iter().map(|f| f.filename.clone()).collect(),
        ));
        self.check_reachable()?;
        if let Some(e) = &self.behavior.register_error {
            return Err(e.clone());
        }
        if self.behavior.register_rejects {
            return Ok(RegistrationResponse { success: false });
        }
        for f in files {
            self.store(&f.filename, f.size, &f.category);
        }
        Ok(RegistrationResponse { success: true })
    }

    async fn create_multipart(
        &self,
        request: &MultipartCreateRequest,
    ) -> Result<MultipartHandle, BackendError> {
        self.record(RecordedCall::CreateMultipart(request.filename.clone()));
        self.check_reachable()?;
        if let Some(e) = &self.behavior.create_multipart_error {
            return Err(e.clone());
        }

        let id = format!("mp-{}", self.multipart_ids.fetch_add(1, Ordering::SeqCst));
        self.multipart_names
            .lock()
            .unwrap()
            .insert(id.clone(), request.category.clone());
        Ok(MultipartHandle { upload_id: id })
    }

    async fn send_multipart(
        &self,
        handle: &MultipartHandle,
        file: &StagedFile,
    ) -> Result<MultipartSendResponse, BackendError> {
        self.record(RecordedCall::SendMultipart(file.file_name.clone()));
        self.check_reachable()?;
        if self.behavior.failing_multipart_sends.contains(&file.file_name) {
            return Err(BackendError::Http {
                status: 500,
                body: "multipart write failed".to_string(),
            });
        }

        let category = self
            .multipart_names
            .lock()
            .unwrap()
            .get(&handle.upload_id)
            .cloned()
            .unwrap_or_default();
        self.store(&file.file_name, file.byte_size, &category);
        Ok(MultipartSendResponse {
            success: true,
            path: None,
        })
    }

    async fn relay_batch(
        &self,
        _container_id: &str,
        category: &str,
        files: &[StagedFile],
    ) -> Result<RelayBatchResponse, BackendError> {
        self.record(RecordedCall::RelayBatch(
            files.iter().map(|f| f.file_name.clone()).collect(),
        ));
        self.check_reachable()?;

        let batch_number = self.relay_batches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.behavior.failing_relay_batches.contains(&batch_number) {
            return Err(BackendError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        for f in files {
            self.store(&f.file_name, f.byte_size, category);
        }
        Ok(RelayBatchResponse {
            uploaded_count: files.len().saturating_sub(self.behavior.relay_shortfall),
        })
    }

    async fn list_files(
        &self,
        _container_id: &str,
        _category: &str,
    ) -> Result<Vec<RemoteFile>, BackendError> {
        self.record(RecordedCall::List);
        self.check_reachable()?;
        if let Some(e) = &self.behavior.list_error {
            return Err(e.clone());
        }
        Ok(self.stored.lock().unwrap().clone())
    }
}

/// Non-image payload of `size` bytes, so the compressor leaves it alone
pub fn blob(name: &str, size: usize) -> RawFile {
    RawFile::new(name, "application/octet-stream", vec![0u8; size])
}

pub const KB: usize = 1024;
pub const MB: usize = 1024 * 1024;
