//! Cached listing types.

use bridge_traits::storage::RemoteFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use std::time::Duration;

/// Mime type recorded when the remote omits one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata for one remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Remote identifier; unique within an account's listing
    #[sqlx(rename = "file_id")]
    pub id: String,
    #[sqlx(rename = "file_name")]
    pub name: String,
    /// Bytes; `None` for remote-native documents without a stored size
    #[sqlx(rename = "file_size")]
    pub size: Option<i64>,
    /// ISO-8601 timestamp as reported by the remote
    pub modified_time: String,
    pub mime_type: String,
    /// Unix seconds when this record entered the cache
    pub cached_at: i64,
}

impl FileRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: None,
            modified_time: String::new(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            cached_at: 0,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified_time(mut self, modified_time: impl Into<String>) -> Self {
        self.modified_time = modified_time.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("File id cannot be empty".to_string());
        }
        if self.size.is_some_and(|size| size < 0) {
            return Err("File size cannot be negative".to_string());
        }
        Ok(())
    }
}

impl From<RemoteFile> for FileRecord {
    fn from(file: RemoteFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            size: file.size,
            modified_time: file.modified_time.unwrap_or_default(),
            mime_type: file
                .mime_type
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            cached_at: 0,
        }
    }
}

/// Point-in-time view of one account's cached listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Most-recently-cached first
    pub records: Arc<Vec<FileRecord>>,
    /// Set by a full replace, cleared by invalidate
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot can answer a listing without a remote call.
    ///
    /// A non-empty snapshot is fresh unless it is older than `ttl`. An empty
    /// one counts only when `allow_empty` is set and a full sync produced it.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Option<Duration>, allow_empty: bool) -> bool {
        if self.is_empty() && !(allow_empty && self.last_synced_at.is_some()) {
            return false;
        }

        match (ttl, self.last_synced_at) {
            (None, _) => true,
            (Some(ttl), Some(synced_at)) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - synced_at <= ttl,
                Err(_) => true,
            },
            // Only upserts so far; there is no sync time to age against.
            (Some(_), None) => false,
        }
    }
}

/// A listing loaded from persistent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedListing {
    pub account: String,
    pub records: Vec<FileRecord>,
    pub last_synced_at: Option<DateTime<Utc>>,
}
