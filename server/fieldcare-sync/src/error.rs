//! Error taxonomy for the sync engine.
//!
//! Operation-level faults (`Structural`, `Forbidden`, `Unsupported`,
//! `NotFound`) are downgraded to `REJECTED` conflicts by the push
//! orchestrator so one bad operation never poisons a batch.
//! `VersionConflict` is not a fault at all but a first-class protocol
//! outcome carrying server state for client reconciliation. Storage and
//! crypto failures are genuine request failures and propagate.

use storage_layer::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed request: {0}")]
    Structural(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Version mismatch: server is at version {server_version}")]
    VersionConflict {
        server_version: i64,
        server_data: Option<serde_json::Value>,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// True for faults that reject a single operation without failing
    /// the surrounding batch.
    pub fn rejects_operation(&self) -> bool {
        matches!(
            self,
            SyncError::Structural(_)
                | SyncError::Forbidden(_)
                | SyncError::Unsupported(_)
                | SyncError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
