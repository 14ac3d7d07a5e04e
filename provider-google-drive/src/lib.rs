//! # Google Drive Provider
//!
//! Implements `StorageProvider` and `AccountInfoProvider` for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - First-page file listing with a fixed field mask
//! - Single-file metadata lookup
//! - Ranged media downloads (`Range: bytes=a-b`)
//! - Resumable uploads (session request followed by a single PUT)
//! - The "who am I" lookup through the `about` resource
//!
//! Access tokens are supplied per call. Non-2xx answers surface as
//! [`BridgeError::Api`](bridge_traits::error::BridgeError::Api) with the
//! provider's status and message.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, DRIVE_API_BASE, DRIVE_UPLOAD_BASE};
pub use error::{GoogleDriveError, Result};
