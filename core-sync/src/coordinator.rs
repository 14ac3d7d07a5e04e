//! # Sync Coordinator
//!
//! List, upload and download operations against the remote store.
//!
//! ## Overview
//!
//! The `SyncCoordinator` sits between callers and the remote storage API:
//! - Checks the session through `SessionManager` before any network call
//! - Decides whether a listing can be answered from `MetadataCache`
//! - Calls the `StorageProvider` with a freshly validated access token
//! - Keeps the cache in step with every remote mutation
//! - Emits progress and completion events via `EventBus`
//!
//! Remote failures are wrapped once into [`SyncError::RemoteApi`] and are
//! never retried here; retrying belongs to the caller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//!
//! // Served from the cache when a usable snapshot exists
//! let files = coordinator.list_files(Some(50), true).await?;
//!
//! let id = coordinator.upload_file("/home/me/notes.txt".as_ref(), None).await?;
//!
//! let saved = coordinator
//!     .download_file(&id, "notes.txt", "/tmp/out".as_ref(), &|percent| {
//!         println!("{}%", percent)
//!     })
//!     .await?;
//! ```

use crate::error::{Result, SyncError};
use bridge_traits::storage::{NewRemoteFile, StorageProvider};
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use core_auth::SessionManager;
use core_cache::{FileRecord, MetadataCache};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// MIME type used when none can be derived from the file name.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

const MAX_PAGE_SIZE: u32 = 1000;

/// Orchestrates remote operations for the signed-in account.
pub struct SyncCoordinator {
    settings: SyncSettings,
    session: Arc<SessionManager>,
    provider: Arc<dyn StorageProvider>,
    cache: Arc<MetadataCache>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl SyncCoordinator {
    pub fn new(
        settings: SyncSettings,
        session: Arc<SessionManager>,
        provider: Arc<dyn StorageProvider>,
        cache: Arc<MetadataCache>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            settings,
            session,
            provider,
            cache,
            event_bus,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// List the account's files.
    ///
    /// With `use_cache`, a usable cached snapshot is returned without any
    /// network call. Otherwise the first remote page is fetched and replaces
    /// the cached listing wholesale. `page_size` defaults to
    /// [`SyncSettings::default_page_size`].
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotAuthenticated`] without a session
    /// - [`SyncError::Configuration`] for a page size outside `1..=1000`
    /// - [`SyncError::RemoteApi`] when the listing call fails
    #[instrument(skip(self))]
    pub async fn list_files(&self, page_size: Option<u32>, use_cache: bool) -> Result<Vec<FileRecord>> {
        let account = self.account()?;
        let page_size = page_size.unwrap_or(self.settings.default_page_size);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(SyncError::Configuration(format!(
                "Page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        if use_cache {
            let snapshot = self.cache.snapshot(&account);
            if snapshot.is_fresh(
                self.clock.now(),
                self.settings.cache_ttl,
                self.settings.cache_empty_listings,
            ) {
                debug!(count = snapshot.len(), "Serving listing from cache");
                self.emit(SyncEvent::ListingServedFromCache {
                    account,
                    file_count: snapshot.len(),
                });
                return Ok(snapshot.records.to_vec());
            }
        }

        let credential = self.session.ensure_valid().await?;
        let remote = self
            .provider
            .list_files(&credential.access_token, page_size)
            .await?;

        let records: Vec<FileRecord> = remote.into_iter().map(FileRecord::from).collect();
        self.cache.replace_all(&account, records).await?;

        let records = self.cache.get(&account);
        info!(count = records.len(), "Listing refreshed from remote");
        self.emit(SyncEvent::ListingRefreshed {
            account,
            file_count: records.len(),
        });

        Ok(records)
    }

    /// Upload a local file and return the new remote id.
    ///
    /// The remote name is `remote_name` or the local base name. The local
    /// file is only read.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] and [`SyncError::FileNotFound`] are
    /// raised before any network call.
    #[instrument(skip(self, local_path), fields(path = %strip_path(&local_path.to_string_lossy())))]
    pub async fn upload_file(&self, local_path: &Path, remote_name: Option<&str>) -> Result<String> {
        let account = self.account()?;

        match tokio::fs::metadata(local_path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(SyncError::FileNotFound(local_path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::FileNotFound(local_path.to_path_buf()))
            }
            Err(e) => return Err(SyncError::LocalIo(e)),
        }

        let name = match remote_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| SyncError::FileNotFound(local_path.to_path_buf()))?,
        };

        let mime_type = mime_guess::from_path(&name)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        let content = Bytes::from(tokio::fs::read(local_path).await?);
        let size = content.len();

        let credential = self.session.ensure_valid().await?;
        let mut created = self
            .provider
            .create_file(
                &credential.access_token,
                NewRemoteFile {
                    name: name.clone(),
                    mime_type: mime_type.clone(),
                    content,
                },
            )
            .await?;

        let file_id = created.id.clone();
        if created.name.is_empty() {
            created.name = name.clone();
        }
        created.size.get_or_insert(size as i64);
        created.mime_type.get_or_insert(mime_type);

        // The file exists remotely at this point; cache trouble is not an
        // upload failure.
        if let Err(e) = self.cache.upsert(&account, FileRecord::from(created)).await {
            warn!(error = %e, file_id = %file_id, "Uploaded file could not be cached");
        }

        info!(file_id = %file_id, bytes = size, "Upload completed");
        self.emit(SyncEvent::UploadCompleted {
            file_id: file_id.clone(),
            name,
        });

        Ok(file_id)
    }

    /// Download `file_id` into `dest_dir/file_name` and return the absolute
    /// path.
    ///
    /// Metadata is fetched first so a missing id fails before any local I/O.
    /// Content is fetched in ranged chunks of
    /// [`SyncSettings::download_chunk_size`] bytes, reporting the completed
    /// percentage after each chunk. The file appears under its final name
    /// only once every chunk has arrived.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotAuthenticated`] without a session
    /// - [`SyncError::RemoteApi`] with status 404 for an unknown id
    /// - [`SyncError::LocalIo`] when the destination cannot be written
    #[instrument(skip(self, dest_dir, progress))]
    pub async fn download_file(
        &self,
        file_id: &str,
        file_name: &str,
        dest_dir: &Path,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<PathBuf> {
        self.account()?;
        let target_name = Self::plain_file_name(file_name)?;

        let credential = self.session.ensure_valid().await?;
        let metadata = self
            .provider
            .get_metadata(&credential.access_token, file_id)
            .await?;

        let mut total = metadata.size.and_then(|size| u64::try_from(size).ok());
        let chunk_size = self.settings.download_chunk_size.max(1);
        let mut content: Vec<u8> = Vec::with_capacity(
            total.map(|t| t.min(chunk_size.saturating_mul(4)) as usize).unwrap_or_default(),
        );
        let mut offset: u64 = 0;
        let mut reported = false;

        while total.map_or(true, |t| offset < t) {
            let length = total.map_or(chunk_size, |t| chunk_size.min(t - offset));
            let credential = self.session.ensure_valid().await?;
            let chunk = self
                .provider
                .download_chunk(&credential.access_token, file_id, offset, length)
                .await?;

            if total.is_none() {
                total = chunk.total_size;
            }

            let received = chunk.data.len() as u64;
            content.extend_from_slice(&chunk.data);
            offset += received;

            let finished = match total {
                Some(t) => offset >= t,
                None => received < length,
            };

            if received == 0 && !finished {
                return Err(SyncError::RemoteApi {
                    status: None,
                    message: format!(
                        "Download of {} stopped at byte {} of {:?}",
                        file_id, offset, total
                    ),
                });
            }

            let percent = match total {
                Some(0) => 100,
                Some(t) => (offset.min(t) * 100 / t) as u8,
                None if finished => 100,
                None => 0,
            };
            progress(percent);
            reported = true;
            self.emit(SyncEvent::DownloadProgress {
                file_id: file_id.to_string(),
                percent,
            });

            if finished {
                break;
            }
        }

        if !reported {
            // Empty remote file
            progress(100);
        }

        let path = Self::write_atomically(dest_dir, target_name, &content).await?;

        info!(file_id = %file_id, bytes = content.len(), "Download completed");
        self.emit(SyncEvent::DownloadCompleted {
            file_id: file_id.to_string(),
            path: path.to_string_lossy().into_owned(),
        });

        Ok(path)
    }

    /// Drop the cached listing of the signed-in account.
    #[instrument(skip(self))]
    pub async fn invalidate_cache(&self) -> Result<()> {
        let account = self.account()?;
        self.cache.invalidate(&account).await?;
        self.emit(SyncEvent::CacheInvalidated { account });
        Ok(())
    }

    fn account(&self) -> Result<String> {
        self.session
            .current_user()
            .ok_or(SyncError::NotAuthenticated)
    }

    fn plain_file_name(file_name: &str) -> Result<&str> {
        let is_plain = !file_name.is_empty()
            && Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
        if is_plain {
            Ok(file_name)
        } else {
            Err(SyncError::LocalIo(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a plain file name", file_name),
            )))
        }
    }

    /// Write to a hidden sibling first, then rename into place.
    async fn write_atomically(dest_dir: &Path, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let final_path = dest_dir.join(file_name);
        let temp_path = dest_dir.join(format!(".{}.{}.part", file_name, Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&temp_path, content).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(tokio::fs::canonicalize(&final_path).await?)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_bus.emit(CoreEvent::Sync(event));
    }
}
