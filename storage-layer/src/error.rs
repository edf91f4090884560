use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Stale version: row was changed since it was read")]
    StaleVersion,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
