//! Storage Abstractions
//!
//! Traits for persisted key-value settings and for the remote object-storage
//! service the sync core talks to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Key-value settings storage trait
///
/// Values are persisted as strings; the typed helpers parse on read so a
/// malformed value surfaces as an error instead of a silent default.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_i64("sync.page_size", 50).await?;
///     store.set_bool("sync.cache_empty_listings", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
            .await
    }

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_string(key).await? {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                other => Err(BridgeError::OperationFailed(format!(
                    "Setting '{}' is not a boolean: {}",
                    key, other
                ))),
            },
        }
    }

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_string(key).await? {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|e| {
                BridgeError::OperationFailed(format!(
                    "Setting '{}' is not an integer: {}",
                    key, e
                ))
            }),
        }
    }
}

/// Metadata of one file as reported by the remote storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size: Option<i64>,
    /// ISO-8601 modification timestamp
    pub modified_time: Option<String>,
    pub mime_type: Option<String>,
}

/// One ranged slice of a file's content.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Bytes,
    /// Total size of the remote object, when the service reported it.
    pub total_size: Option<u64>,
}

/// Content and metadata for a resumable create.
#[derive(Debug, Clone)]
pub struct NewRemoteFile {
    pub name: String,
    pub mime_type: String,
    pub content: Bytes,
}

/// Remote object-storage service
///
/// Every call carries the bearer token explicitly so the caller decides when
/// credentials are validated or refreshed.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Fetch the first page of the caller's files.
    async fn list_files(&self, access_token: &str, page_size: u32) -> Result<Vec<RemoteFile>>;

    /// Fetch metadata for a single file.
    ///
    /// # Errors
    ///
    /// A missing file is reported as [`BridgeError::Api`] with status 404.
    async fn get_metadata(&self, access_token: &str, file_id: &str) -> Result<RemoteFile>;

    /// Download `length` bytes of content starting at `offset`.
    async fn download_chunk(
        &self,
        access_token: &str,
        file_id: &str,
        offset: u64,
        length: u64,
    ) -> Result<MediaChunk>;

    /// Create a file through a resumable upload session.
    async fn create_file(&self, access_token: &str, file: NewRemoteFile) -> Result<RemoteFile>;
}

/// Resolves the account identity behind an access token ("who am I").
#[async_trait]
pub trait AccountInfoProvider: Send + Sync {
    /// Returns the account's e-mail address.
    async fn current_account(&self, access_token: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn set_string(&self, key: &str, value: &str) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> Result<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_typed_helpers_parse_strings() {
        let store = MemorySettings::default();
        store.set_i64("sync.page_size", 25).await.unwrap();
        store.set_bool("sync.cache_empty_listings", true).await.unwrap();

        assert_eq!(store.get_i64("sync.page_size").await.unwrap(), Some(25));
        assert_eq!(
            store.get_bool("sync.cache_empty_listings").await.unwrap(),
            Some(true)
        );
        assert!(store.has_key("sync.page_size").await.unwrap());
        assert_eq!(store.get_i64("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_values_are_errors() {
        let store = MemorySettings::default();
        store.set_string("sync.page_size", "lots").await.unwrap();
        store.set_string("flag", "maybe").await.unwrap();

        assert!(store.get_i64("sync.page_size").await.is_err());
        assert!(store.get_bool("flag").await.is_err());
    }
}
