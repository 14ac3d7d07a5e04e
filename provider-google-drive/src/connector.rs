//! Google Drive API connector implementation
//!
//! Implements `StorageProvider` and `AccountInfoProvider` for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{
    AccountInfoProvider, MediaChunk, NewRemoteFile, RemoteFile, StorageProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{AboutResponse, CreateFileRequest, DriveFile, ErrorResponse, FilesListResponse};

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive media upload base URL
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,size,modifiedTime,mimeType";

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

/// Google Drive API connector
///
/// Stateless apart from the HTTP client: the bearer token arrives with each
/// call. Requests are sent once; retrying is left to the caller.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::storage::StorageProvider;
///
/// let connector = GoogleDriveConnector::new(http_client);
/// let files = connector.list_files(&credential.access_token, 10).await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Point the connector at different endpoints, e.g. a local emulator.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    fn get(&self, url: String, access_token: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(METADATA_TIMEOUT)
    }

    /// Send once and turn any non-2xx status into [`GoogleDriveError::ApiError`].
    #[instrument(skip(self, request), fields(method = ?request.method))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            return Ok(response);
        }

        let status = response.status;
        let message = serde_json::from_slice::<ErrorResponse>(&response.body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).trim().to_string());

        warn!(status, error = %message, "API request failed");
        Err(GoogleDriveError::ApiError {
            status_code: status,
            message,
        }
        .into())
    }

    fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
        })
    }

    fn convert_file(drive_file: DriveFile) -> RemoteFile {
        RemoteFile {
            id: drive_file.id,
            name: drive_file.name,
            size: drive_file.size.and_then(|s| s.parse().ok()),
            modified_time: drive_file.modified_time,
            mime_type: drive_file.mime_type,
        }
    }

    /// Total object size from `Content-Range: bytes 0-9/20`.
    fn parse_content_range_total(value: &str) -> Option<u64> {
        value.rsplit('/').next()?.trim().parse().ok()
    }
}

#[async_trait]
impl StorageProvider for GoogleDriveConnector {
    #[instrument(skip(self, access_token))]
    async fn list_files(&self, access_token: &str, page_size: u32) -> Result<Vec<RemoteFile>> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let url = format!(
            "{}/files?pageSize={}&fields={}",
            self.api_base,
            page_size,
            urlencoding::encode(&fields)
        );

        let response = self.send(self.get(url, access_token)).await?;
        let list_response: FilesListResponse = Self::parse(&response, "files list response")?;

        let files: Vec<RemoteFile> = list_response
            .files
            .into_iter()
            .map(Self::convert_file)
            .collect();

        info!(count = files.len(), "Listed files from Google Drive");
        Ok(files)
    }

    #[instrument(skip(self, access_token), fields(file_id = %file_id))]
    async fn get_metadata(&self, access_token: &str, file_id: &str) -> Result<RemoteFile> {
        let url = format!(
            "{}/files/{}?fields={}",
            self.api_base,
            urlencoding::encode(file_id),
            urlencoding::encode(FILE_FIELDS)
        );

        let response = self.send(self.get(url, access_token)).await?;
        let drive_file: DriveFile = Self::parse(&response, "file metadata")?;

        Ok(Self::convert_file(drive_file))
    }

    #[instrument(skip(self, access_token), fields(file_id = %file_id))]
    async fn download_chunk(
        &self,
        access_token: &str,
        file_id: &str,
        offset: u64,
        length: u64,
    ) -> Result<MediaChunk> {
        let url = format!(
            "{}/files/{}?alt=media",
            self.api_base,
            urlencoding::encode(file_id)
        );
        let last_byte = offset + length.max(1) - 1;

        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Range", format!("bytes={}-{}", offset, last_byte))
            .timeout(MEDIA_TIMEOUT);

        let response = self.send(request).await?;

        let total_size = match response.status {
            206 => response
                .header("Content-Range")
                .and_then(Self::parse_content_range_total),
            // The whole object came back despite the range.
            _ => Some(response.body.len() as u64),
        };

        debug!(bytes = response.body.len(), ?total_size, "Downloaded chunk");
        Ok(MediaChunk {
            data: response.body,
            total_size,
        })
    }

    #[instrument(skip(self, access_token, file), fields(name = %file.name, bytes = file.content.len()))]
    async fn create_file(&self, access_token: &str, file: NewRemoteFile) -> Result<RemoteFile> {
        let url = format!(
            "{}/files?uploadType=resumable&fields={}",
            self.upload_base,
            urlencoding::encode(FILE_FIELDS)
        );

        let session_request = HttpRequest::new(HttpMethod::Post, url)
            .bearer_token(access_token)
            .header("X-Upload-Content-Type", file.mime_type.as_str())
            .header("X-Upload-Content-Length", file.content.len().to_string())
            .timeout(METADATA_TIMEOUT)
            .json(&CreateFileRequest {
                name: &file.name,
                mime_type: &file.mime_type,
            })?;

        let session = self.send(session_request).await?;
        let location = session
            .header("Location")
            .ok_or(GoogleDriveError::MissingUploadLocation)?
            .to_string();

        debug!("Opened resumable upload session");

        let upload_request = HttpRequest::new(HttpMethod::Put, location)
            .bearer_token(access_token)
            .header("Content-Type", file.mime_type.as_str())
            .header("Content-Length", file.content.len().to_string())
            .timeout(MEDIA_TIMEOUT)
            .body(file.content);

        let response = self.send(upload_request).await?;
        let drive_file: DriveFile = Self::parse(&response, "created file")?;

        info!(file_id = %drive_file.id, "Uploaded file to Google Drive");
        Ok(Self::convert_file(drive_file))
    }
}

#[async_trait]
impl AccountInfoProvider for GoogleDriveConnector {
    #[instrument(skip(self, access_token))]
    async fn current_account(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/about?fields=user", self.api_base);

        let response = self.send(self.get(url, access_token)).await?;
        let about: AboutResponse = Self::parse(&response, "about response")?;

        about.user.email_address.ok_or_else(|| {
            GoogleDriveError::ParseError("about response has no emailAddress".to_string()).into()
        })
    }
}
