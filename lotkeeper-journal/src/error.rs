//! Journal error types.

use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record corrupted in segment {segment} at offset {offset}: CRC mismatch (expected {expected:#x}, got {actual:#x})")]
    CorruptedRecord {
        segment: u64,
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("invalid record header in segment {segment} at offset {offset}: {reason}")]
    InvalidHeader {
        segment: u64,
        offset: u64,
        reason: String,
    },

    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("journal is closed")]
    Closed,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JournalError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JournalError::Io(_))
    }

    /// Returns whether this error means on-disk data cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            JournalError::CorruptedRecord { .. } | JournalError::InvalidHeader { .. }
        )
    }

    /// Attaches a segment id to header/CRC errors raised while decoding.
    pub(crate) fn in_segment(self, id: u64) -> Self {
        match self {
            JournalError::CorruptedRecord {
                offset,
                expected,
                actual,
                ..
            } => JournalError::CorruptedRecord {
                segment: id,
                offset,
                expected,
                actual,
            },
            JournalError::InvalidHeader { offset, reason, .. } => JournalError::InvalidHeader {
                segment: id,
                offset,
                reason,
            },
            other => other,
        }
    }
}
