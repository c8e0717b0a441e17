//! Storage error types.

use lotkeeper_core::{StoreError, StoreErrorKind};
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("journal error: {0}")]
    Journal(#[from] lotkeeper_journal::JournalError),

    #[error("data corruption: {0}")]
    Corruption(String),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::Journal(lotkeeper_journal::JournalError::Io(_)) => StoreErrorKind::Io,
            StorageError::Journal(lotkeeper_journal::JournalError::Closed) => {
                StoreErrorKind::Unavailable
            }
            StorageError::Journal(e) if e.is_corruption() => StoreErrorKind::Corruption,
            StorageError::Journal(_) => StoreErrorKind::Other,
            StorageError::Corruption(_) => StoreErrorKind::Corruption,
        };
        StoreError::new(kind, err.to_string())
    }
}
