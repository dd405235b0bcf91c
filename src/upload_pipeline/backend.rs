//! Backend contracts consumed by the pipeline.
//!
//! `StudioBackend` is the seam between the orchestrator and the studio server plus
//! object storage. `HttpBackend` speaks the REST endpoints with reqwest.

use crate::config::UploaderConfig;
use crate::error::{BackendError, UploadError};
use crate::upload_pipeline::types::{RemoteFile, StagedFile};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `{filename, size, category}` as sent to authorization and registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    pub size: u64,
    pub category: String,
}

impl FileDescriptor {
    pub fn for_file(file: &StagedFile, category: &str) -> Self {
        Self {
            filename: file.file_name.clone(),
            size: file.byte_size,
            category: category.to_string(),
        }
    }
}

/// One entry of the authorization response; either a grant or a per-item error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectAuthorization {
    pub filename: String,
    #[serde(default)]
    pub write_url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Storage key, when the backend reports it separately from the URL
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A usable, single-write storage authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGrant {
    pub filename: String,
    pub write_url: String,
    pub content_type: String,
    pub key: Option<String>,
}

impl DirectAuthorization {
    pub fn into_grant(self, fallback_content_type: &str) -> Result<WriteGrant, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let write_url = self
            .write_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| format!("no write URL issued for {}", self.filename))?;

        Ok(WriteGrant {
            filename: self.filename,
            write_url,
            content_type: self
                .content_type
                .unwrap_or_else(|| fallback_content_type.to_string()),
            key: self.key,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct AuthorizeRequest<'a> {
    files: &'a [FileDescriptor],
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorizeResponse {
    #[serde(alias = "urls")]
    uploads: Vec<DirectAuthorization>,
}

#[derive(Debug, Clone, Serialize)]
struct RegisterRequest<'a> {
    files: &'a [FileDescriptor],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartCreateRequest {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub session_id: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartHandle {
    pub upload_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSendResponse {
    pub success: bool,
    /// Storage path, when the server reports one
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayBatchResponse {
    pub uploaded_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingResponse {
    Bare(Vec<RemoteFile>),
    Wrapped { files: Vec<RemoteFile> },
}

/// Request/response operations the orchestrator needs from the outside world
#[async_trait]
pub trait StudioBackend: Send + Sync {
    /// Request one short-lived write authorization per file
    async fn authorize_direct(
        &self,
        container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<Vec<DirectAuthorization>, BackendError>;

    /// Write the bytes straight to object storage
    async fn write_direct(&self, grant: &WriteGrant, file: &StagedFile) -> Result<(), BackendError>;

    /// Register directly written files with the metadata store
    async fn register_uploads(
        &self,
        container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<RegistrationResponse, BackendError>;

    async fn create_multipart(
        &self,
        request: &MultipartCreateRequest,
    ) -> Result<MultipartHandle, BackendError>;

    async fn send_multipart(
        &self,
        handle: &MultipartHandle,
        file: &StagedFile,
    ) -> Result<MultipartSendResponse, BackendError>;

    /// Upload a group of small files through the application server
    async fn relay_batch(
        &self,
        container_id: &str,
        category: &str,
        files: &[StagedFile],
    ) -> Result<RelayBatchResponse, BackendError>;

    async fn list_files(
        &self,
        container_id: &str,
        category: &str,
    ) -> Result<Vec<RemoteFile>, BackendError>;
}

/// reqwest implementation of [`StudioBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(server_url: &str, api_key: &str) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &UploaderConfig) -> Result<Self, UploadError> {
        let server_url = config
            .server_url
            .as_deref()
            .ok_or_else(|| UploadError::Config("No server URL configured".to_string()))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| UploadError::Config("No API key configured".to_string()))?;
        Self::new(server_url, api_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

/// Turn a non-success status into [`BackendError::Http`] carrying the body text
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(BackendError::Http { status, body })
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn file_part(file: &StagedFile) -> Result<Part, BackendError> {
    Part::stream_with_length(reqwest::Body::from(file.payload.clone()), file.byte_size)
        .file_name(file.file_name.clone())
        .mime_str(&file.mime_type)
        .map_err(|e| BackendError::Decode(format!("invalid MIME type {}: {}", file.mime_type, e)))
}

#[async_trait]
impl StudioBackend for HttpBackend {
    async fn authorize_direct(
        &self,
        container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<Vec<DirectAuthorization>, BackendError> {
        let url = self.url(&format!("/api/sessions/{}/uploads/authorize", container_id));
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&AuthorizeRequest { files })
            .send()
            .await?;

        let parsed: AuthorizeResponse = decode(check_status(response).await?).await?;
        Ok(parsed.uploads)
    }

    async fn write_direct(&self, grant: &WriteGrant, file: &StagedFile) -> Result<(), BackendError> {
        let response = self
            .client
            .put(&grant.write_url)
            .header("Content-Type", grant.content_type.as_str())
            .body(file.payload.clone())
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn register_uploads(
        &self,
        container_id: &str,
        files: &[FileDescriptor],
    ) -> Result<RegistrationResponse, BackendError> {
        let url = self.url(&format!("/api/sessions/{}/uploads/register", container_id));
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&RegisterRequest { files })
            .send()
            .await?;

        decode(check_status(response).await?).await
    }

    async fn create_multipart(
        &self,
        request: &MultipartCreateRequest,
    ) -> Result<MultipartHandle, BackendError> {
        let response = self
            .client
            .post(self.url("/api/uploads/multipart"))
            .header("Authorization", self.bearer())
            .json(request)
            .send()
            .await?;

        decode(check_status(response).await?).await
    }

    async fn send_multipart(
        &self,
        handle: &MultipartHandle,
        file: &StagedFile,
    ) -> Result<MultipartSendResponse, BackendError> {
        let url = self.url(&format!("/api/uploads/multipart/{}", handle.upload_id));
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/octet-stream")
            .body(file.payload.clone())
            .send()
            .await?;

        decode(check_status(response).await?).await
    }

    async fn relay_batch(
        &self,
        container_id: &str,
        category: &str,
        files: &[StagedFile],
    ) -> Result<RelayBatchResponse, BackendError> {
        let mut form = Form::new().text("category", category.to_string());
        for file in files {
            form = form.part("files", file_part(file)?);
        }

        let url = self.url(&format!("/api/sessions/{}/files", container_id));
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;

        decode(check_status(response).await?).await
    }

    async fn list_files(
        &self,
        container_id: &str,
        category: &str,
    ) -> Result<Vec<RemoteFile>, BackendError> {
        let url = self.url(&format!("/api/sessions/{}/files", container_id));
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .query(&[("category", category)])
            .send()
            .await?;

        let listing: ListingResponse = decode(check_status(response).await?).await?;
        Ok(match listing {
            ListingResponse::Bare(files) => files,
            ListingResponse::Wrapped { files } => files,
        })
    }
}
