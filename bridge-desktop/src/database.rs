//! # SQLite Connection Pool
//!
//! Shared pool for the session, settings and file cache tables.
//!
//! ## Features
//!
//! - **WAL Mode**: multiple readers alongside the single writer
//! - **Automatic Migrations**: embedded with `sqlx::migrate!` and applied on creation
//! - **Health Check**: `SELECT 1` before the pool is handed out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_desktop::database::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("filesyncer.db")).await?;
//! ```

use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Create a configuration for a database file
    ///
    /// # Arguments
    ///
    /// * `database_path` - Path to the SQLite database file
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let path_str = path.to_string_lossy().replace('\\', "/");

        Self {
            database_url: format!("sqlite:{}", path_str),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// In-memory database on a single pinned connection
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is limited to one connection that is never recycled.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

/// Create a configured SQLite connection pool
///
/// Creates the database file (and its parent directory) if needed, applies
/// migrations and runs a health check.
///
/// # Errors
///
/// Returns [`BridgeError::DatabaseError`] if the database cannot be opened,
/// migrated or queried.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    if !config.is_in_memory() {
        let path = PathBuf::from(config.database_url.trim_start_matches("sqlite:"));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| BridgeError::DatabaseError(format!("Invalid database URL: {}", e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if config.is_in_memory() {
        pool_options = pool_options.max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            BridgeError::DatabaseError(e.to_string())
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    info!("Database connection pool ready");
    Ok(pool)
}

/// In-memory pool with migrations applied, for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("Running database migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        BridgeError::DatabaseError(format!("Migration failed: {}", e))
    })?;

    Ok(())
}

async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Health check failed: {}", e)))?;
    Ok(())
}
