//! Core error types.

use crate::model::LotId;
use crate::store::StoreError;
use thiserror::Error;

/// Errors from the parking engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("parking lot not found: {lot_id}")]
    LotNotFound { lot_id: LotId },

    #[error("no available space in parking lot {lot_id}")]
    NoAvailableSpace { lot_id: LotId },

    #[error("no parked vehicle '{plate}' in parking lot {lot_id}")]
    OccupantNotFound { lot_id: LotId, plate: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("internal invariant violated: {reason}")]
    Internal { reason: String },
}

impl CoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Returns whether a caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Persistence(e) if e.is_retryable())
    }

    /// Returns an error code suitable for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            CoreError::LotNotFound { .. } => "LOT_NOT_FOUND",
            CoreError::NoAvailableSpace { .. } => "NO_AVAILABLE_SPACE",
            CoreError::OccupantNotFound { .. } => "OCCUPANT_NOT_FOUND",
            CoreError::Persistence(_) => "PERSISTENCE_FAILURE",
            CoreError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
