use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_cache::CacheError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired, please re-authenticate: {0}")]
    AuthExpired(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote service rejected the call or could not be reached.
    #[error("Remote API error{}: {}", status_suffix(.status), .message)]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },

    #[error("Local file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    #[error("Cache error: {0}")]
    Cache(CacheError),

    #[error("Authentication error: {0}")]
    Auth(AuthError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl SyncError {
    /// HTTP status of a remote failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::RemoteApi { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<AuthError> for SyncError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotAuthenticated => SyncError::NotAuthenticated,
            AuthError::AuthExpired(reason) => SyncError::AuthExpired(reason),
            AuthError::Configuration(message) => SyncError::Configuration(message),
            other => SyncError::Auth(other),
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Api { status, message } => SyncError::RemoteApi {
                status: Some(status),
                message,
            },
            other => SyncError::RemoteApi {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<CacheError> for SyncError {
    fn from(error: CacheError) -> Self {
        match error {
            inconsistency @ CacheError::Inconsistency { .. } => {
                SyncError::CacheInconsistency(inconsistency.to_string())
            }
            other => SyncError::Cache(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
