//! # Metadata Cache
//!
//! Per-account mirror of the remote listing.
//!
//! Readers clone an `Arc` snapshot under a short lock and never wait on I/O.
//! Writers are serialized by an async lock, write through to the optional
//! [`FileCacheRepository`] first, then swap the in-memory snapshot.

use crate::error::{CacheError, Result};
use crate::models::{CacheSnapshot, FileRecord};
use crate::repository::FileCacheRepository;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheSnapshot>,
    generation: u64,
}

/// Local cache of remote file listings, keyed by account.
pub struct MetadataCache {
    state: RwLock<CacheState>,
    writer: Mutex<()>,
    repository: Option<Arc<dyn FileCacheRepository>>,
    clock: Arc<dyn Clock>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    /// Memory-only cache.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            writer: Mutex::new(()),
            repository: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Cache that writes through to `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn FileCacheRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cached records for `account`, most-recently-cached first.
    pub fn get(&self, account: &str) -> Vec<FileRecord> {
        self.snapshot(account).records.as_ref().clone()
    }

    pub fn snapshot(&self, account: &str) -> CacheSnapshot {
        self.read_state()
            .entries
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    /// Monotonic counter bumped by every committed mutation.
    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    /// Load persisted listings. Returns the number of accounts restored.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<usize> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };

        let _guard = self.writer.lock().await;
        let listings = repository.load_all().await?;
        let count = listings.len();

        let mut state = self.write_state();
        for listing in listings {
            state.entries.insert(
                listing.account,
                CacheSnapshot {
                    records: Arc::new(listing.records),
                    last_synced_at: listing.last_synced_at,
                },
            );
        }
        state.generation += 1;

        info!(accounts = count, "Hydrated metadata cache");
        Ok(count)
    }

    /// Replace the account's whole listing and mark it as synced now.
    ///
    /// Duplicate ids keep their first occurrence.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn replace_all(&self, account: &str, records: Vec<FileRecord>) -> Result<()> {
        let _guard = self.writer.lock().await;
        let expected = self.generation();
        let now = self.clock.now();

        let mut seen = HashSet::with_capacity(records.len());
        let mut stamped = Vec::with_capacity(records.len());
        for mut record in records {
            validate(&record)?;
            if seen.insert(record.id.clone()) {
                record.cached_at = now.timestamp();
                stamped.push(record);
            }
        }

        if let Some(repository) = &self.repository {
            repository.replace_all(account, &stamped, now).await?;
        }

        debug!(count = stamped.len(), "Replaced cached listing");
        self.commit(
            account,
            expected,
            CacheSnapshot {
                records: Arc::new(stamped),
                last_synced_at: Some(now),
            },
        )
    }

    /// Insert `record` at the front, replacing any record with the same id.
    #[instrument(skip(self, record), fields(file_id = %record.id))]
    pub async fn upsert(&self, account: &str, mut record: FileRecord) -> Result<()> {
        validate(&record)?;

        let _guard = self.writer.lock().await;
        let expected = self.generation();
        let current = self.snapshot(account);
        record.cached_at = self.clock.now().timestamp();

        if let Some(repository) = &self.repository {
            repository.upsert(account, &record).await?;
        }

        let mut records = Vec::with_capacity(current.len() + 1);
        let id = record.id.clone();
        records.push(record);
        records.extend(
            current
                .records
                .iter()
                .filter(|existing| existing.id != id)
                .cloned(),
        );

        self.commit(
            account,
            expected,
            CacheSnapshot {
                records: Arc::new(records),
                last_synced_at: current.last_synced_at,
            },
        )
    }

    /// Empty the account's listing so the next listing goes to the remote.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, account: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let expected = self.generation();

        if let Some(repository) = &self.repository {
            repository.invalidate(account).await?;
        }

        debug!("Invalidated cached listing");
        self.commit(account, expected, CacheSnapshot::default())
    }

    /// Swap in `snapshot` if nothing else committed since `expected` was read.
    fn commit(&self, account: &str, expected: u64, snapshot: CacheSnapshot) -> Result<()> {
        let mut state = self.write_state();
        if state.generation != expected {
            return Err(CacheError::Inconsistency {
                account: account.to_string(),
                expected,
                found: state.generation,
            });
        }

        state.entries.insert(account.to_string(), snapshot);
        state.generation += 1;
        Ok(())
    }

    /// When the account's listing was last fully synced.
    pub fn last_synced_at(&self, account: &str) -> Option<DateTime<Utc>> {
        self.snapshot(account).last_synced_at
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate(record: &FileRecord) -> Result<()> {
    record
        .validate()
        .map_err(|message| CacheError::InvalidRecord {
            field: "file".to_string(),
            message,
        })
}
