//! # Sync Module
//!
//! Orchestrates file operations against the remote storage service.
//!
//! ## Overview
//!
//! This module provides:
//! - Listing remote files, served from `MetadataCache` when the snapshot is usable
//! - Uploading local files through resumable creates
//! - Chunked downloads with progress reporting and atomic placement
//! - Background execution with ordered progress and a single terminal event
//!
//! ## Components
//!
//! - **Sync Coordinator** (`coordinator`): list/upload/download and cache upkeep
//! - **Task Runner** (`task`): runs operations on the tokio runtime and reports their outcome

pub mod coordinator;
pub mod error;
pub mod task;

pub use coordinator::{SyncCoordinator, FALLBACK_MIME_TYPE};
pub use error::{Result, SyncError};
pub use task::{ProgressReporter, TaskError, TaskEvent, TaskHandle, TaskId, TaskRunner};
