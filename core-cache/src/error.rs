use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The snapshot changed between reading and committing a mutation.
    #[error("Cache inconsistency for {account}: expected generation {expected}, found {found}")]
    Inconsistency {
        account: String,
        expected: u64,
        found: u64,
    },

    #[error("Invalid record: {field} - {message}")]
    InvalidRecord { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;
