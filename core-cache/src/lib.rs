//! # Metadata Cache
//!
//! Local mirror of remote file listings so repeated listings avoid the
//! network, with write-through persistence for restarts.

pub mod cache;
pub mod error;
pub mod models;
pub mod repository;

pub use cache::MetadataCache;
pub use error::{CacheError, Result};
pub use models::{CacheSnapshot, FileRecord, PersistedListing, DEFAULT_MIME_TYPE};
pub use repository::{FileCacheRepository, SqliteFileCacheRepository};
