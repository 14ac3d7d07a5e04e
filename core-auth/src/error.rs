use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The OAuth client-secret artifact is missing or unreadable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The credential can no longer be refreshed; a fresh sign-in is required.
    #[error("Session expired, please re-authenticate: {0}")]
    AuthExpired(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("OAuth state mismatch in authorization callback")]
    StateMismatch,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Stored credential is corrupted: {0}")]
    CredentialCorrupted(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
