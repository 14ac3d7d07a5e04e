//! # Core Configuration Module
//!
//! Configuration for the file sync core.
//!
//! ## Overview
//!
//! [`CoreConfig`] is assembled with a builder and validated fail-fast before
//! any component is constructed. It carries:
//!
//! - the SQLite database path holding sessions, settings and the metadata cache
//! - the path of the OAuth client-secret file (`credentials.json` by default)
//! - the OAuth scopes to request and the interactive sign-in timeout
//! - an optional injected `HttpClient` (the desktop bootstrap supplies reqwest)
//! - [`SyncSettings`], the tunables persisted in the `app_settings` table
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/filesyncer.db")
//!     .client_secrets_path("/path/to/credentials.json")
//!     .build()?;
//! ```
//!
//! ## Persisted overrides
//!
//! [`SyncSettings::load_overrides`] reads `sync.*` keys from a
//! [`SettingsStore`] so values chosen by the user survive restarts.

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Scope granting full access to the user's Drive files.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// File name of the OAuth client-secret artifact.
pub const DEFAULT_CLIENT_SECRETS_FILE: &str = "credentials.json";

/// File name of the application database.
pub const DEFAULT_DATABASE_FILE: &str = "filesyncer.db";

/// Interactive sign-in must finish within this window.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Keys of persisted sync settings.
pub mod keys {
    pub const PAGE_SIZE: &str = "sync.page_size";
    pub const CACHE_TTL_SECS: &str = "sync.cache_ttl_secs";
    pub const CACHE_EMPTY_LISTINGS: &str = "sync.cache_empty_listings";
    pub const DOWNLOAD_CHUNK_SIZE: &str = "sync.download_chunk_size";
}

const MAX_PAGE_SIZE: u32 = 1000;

/// Tunables for listing, caching and transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Page size used when the caller does not pass one
    pub default_page_size: u32,

    /// Maximum age of a cached listing; `None` trusts the cache until it is
    /// refreshed or invalidated explicitly
    pub cache_ttl: Option<Duration>,

    /// Treat an empty listing that was actually fetched as a cache hit
    pub cache_empty_listings: bool,

    /// Bytes requested per ranged download call
    pub download_chunk_size: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            cache_ttl: None,
            cache_empty_listings: false,
            download_chunk_size: 10 * 1024 * 1024,
        }
    }
}

impl SyncSettings {
    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_empty_listings(mut self, enabled: bool) -> Self {
        self.cache_empty_listings = enabled;
        self
    }

    pub fn with_download_chunk_size(mut self, bytes: u64) -> Self {
        self.download_chunk_size = bytes;
        self
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 || self.default_page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.download_chunk_size == 0 {
            return Err(Error::Config(
                "Download chunk size must be greater than 0 bytes".to_string(),
            ));
        }

        if matches!(self.cache_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(Error::Config(
                "Cache TTL must be positive; leave it unset to disable expiry".to_string(),
            ));
        }

        Ok(())
    }

    /// Applies values persisted in the settings store on top of `self`.
    ///
    /// Missing keys keep the current value. A persisted TTL of 0 clears the TTL.
    ///
    /// # Errors
    ///
    /// Fails when a stored value cannot be parsed or the result does not
    /// validate.
    pub async fn load_overrides(mut self, store: &dyn SettingsStore) -> Result<Self> {
        if let Some(page_size) = store.get_i64(keys::PAGE_SIZE).await? {
            self.default_page_size = u32::try_from(page_size).map_err(|_| {
                Error::Config(format!("Stored page size out of range: {}", page_size))
            })?;
        }

        if let Some(ttl) = store.get_i64(keys::CACHE_TTL_SECS).await? {
            self.cache_ttl = match u64::try_from(ttl) {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(Error::Config(format!("Stored cache TTL is negative: {}", ttl)))
                }
            };
        }

        if let Some(enabled) = store.get_bool(keys::CACHE_EMPTY_LISTINGS).await? {
            self.cache_empty_listings = enabled;
        }

        if let Some(chunk) = store.get_i64(keys::DOWNLOAD_CHUNK_SIZE).await? {
            self.download_chunk_size = u64::try_from(chunk).map_err(|_| {
                Error::Config(format!("Stored chunk size out of range: {}", chunk))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Writes every field to the settings store.
    pub async fn persist(&self, store: &dyn SettingsStore) -> Result<()> {
        store
            .set_i64(keys::PAGE_SIZE, i64::from(self.default_page_size))
            .await?;
        store
            .set_i64(
                keys::CACHE_TTL_SECS,
                self.cache_ttl.map(|ttl| ttl.as_secs() as i64).unwrap_or(0),
            )
            .await?;
        store
            .set_bool(keys::CACHE_EMPTY_LISTINGS, self.cache_empty_listings)
            .await?;
        store
            .set_i64(keys::DOWNLOAD_CHUNK_SIZE, self.download_chunk_size as i64)
            .await?;
        Ok(())
    }
}

/// Core configuration for the file sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Path to the OAuth client-secret file
    pub client_secrets_path: PathBuf,

    /// OAuth scopes requested during sign-in
    pub scopes: Vec<String>,

    /// Upper bound for the interactive sign-in
    pub auth_timeout: Duration,

    /// Loopback port for the OAuth redirect; 0 picks a free port
    pub callback_port: u16,

    /// HTTP client for API requests (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Listing, cache and transfer tunables
    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("client_secrets_path", &self.client_secrets_path)
            .field("scopes", &self.scopes)
            .field("auth_timeout", &self.auth_timeout)
            .field("callback_port", &self.callback_port)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// The client-secret file is not required to exist here; its absence is
    /// reported when authentication is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.client_secrets_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "Client secrets path cannot be empty".to_string(),
            ));
        }

        if self.scopes.is_empty() {
            return Err(Error::Config(
                "At least one OAuth scope is required".to_string(),
            ));
        }

        if self.auth_timeout.is_zero() {
            return Err(Error::Config(
                "Authentication timeout must be greater than zero".to_string(),
            ));
        }

        self.sync.validate()
    }
}

/// Default location of the database: the platform data directory, or the
/// working directory when none is known.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("filesyncer").join(DEFAULT_DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    client_secrets_path: Option<PathBuf>,
    scopes: Option<Vec<String>>,
    auth_timeout: Option<Duration>,
    callback_port: Option<u16>,
    http_client: Option<Arc<dyn HttpClient>>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// Default: `<data dir>/filesyncer/filesyncer.db`
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the OAuth client-secret file.
    ///
    /// Default: `credentials.json` in the working directory
    pub fn client_secrets_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.client_secrets_path = Some(path.into());
        self
    }

    /// Replaces the requested scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    pub fn callback_port(mut self, port: u16) -> Self {
        self.callback_port = Some(port);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop bootstrap creates a reqwest-based client.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            database_path: self.database_path.unwrap_or_else(default_database_path),
            client_secrets_path: self
                .client_secrets_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_SECRETS_FILE)),
            scopes: self
                .scopes
                .unwrap_or_else(|| vec![DRIVE_SCOPE.to_string()]),
            auth_timeout: self.auth_timeout.unwrap_or(DEFAULT_AUTH_TIMEOUT),
            callback_port: self.callback_port.unwrap_or(0),
            http_client: self.http_client,
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
