//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls)
//! - `SettingsStore` using the SQLite `app_settings` table
//! - the shared SQLite pool (`database::create_pool`) with embedded migrations
//!   for sessions, settings and the file metadata cache
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{create_pool, DatabaseConfig, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool(DatabaseConfig::new("filesyncer.db")).await?;
//!     let settings = SqliteSettingsStore::new(pool.clone());
//!     let http_client = ReqwestHttpClient::new()?;
//!     Ok(())
//! }
//! ```

pub mod database;
mod http;
mod settings;

pub use database::{create_pool, create_test_pool, DatabaseConfig};
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
