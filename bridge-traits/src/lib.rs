//! # Host Bridge Traits
//!
//! Abstractions the sync core needs from its host environment.
//!
//! ## Overview
//!
//! The core never talks to sockets, SQLite settings tables or the remote
//! storage API directly. It goes through the traits defined here, which lets
//! the desktop bridge provide production implementations and lets tests swap
//! in `mockall` mocks.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and per-request timeouts
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//! - [`StorageProvider`](storage::StorageProvider) - Remote list/get/download/create operations
//! - [`AccountInfoProvider`](storage::AccountInfoProvider) - "Who am I" lookup for an access token
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Remote failures
//! carry the provider's HTTP status in [`BridgeError::Api`] so upper layers can
//! wrap them exactly once.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across tokio
//! tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{
    AccountInfoProvider, MediaChunk, NewRemoteFile, RemoteFile, SettingsStore, StorageProvider,
};
pub use time::{Clock, LogLevel, SystemClock};
