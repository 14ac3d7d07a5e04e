use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::error::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    /// `true` when the caller has to sign in (again) before retrying.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            CoreError::Auth(core_auth::AuthError::NotAuthenticated)
                | CoreError::Auth(core_auth::AuthError::AuthExpired(_))
                | CoreError::Sync(core_sync::SyncError::NotAuthenticated)
                | CoreError::Sync(core_sync::SyncError::AuthExpired(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
