//! Server error types.

use hyper::StatusCode;
use lotkeeper_core::CoreError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] lotkeeper_storage::StorageError),

    #[error("invalid request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("no such endpoint: {0}")]
    RouteNotFound(String),

    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Core(e) => match e {
                CoreError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
                CoreError::LotNotFound { .. } | CoreError::OccupantNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                CoreError::NoAvailableSpace { .. } => StatusCode::CONFLICT,
                CoreError::Persistence(_) | CoreError::Internal { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::Json(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::Io(_) | ServerError::Storage(_) | ServerError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code reported to clients and in metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Core(e) => e.error_code(),
            ServerError::Json(_) | ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::BodyTooLarge { .. } => "BODY_TOO_LARGE",
            ServerError::RouteNotFound(_) => "NOT_FOUND",
            ServerError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ServerError::Io(_) | ServerError::Storage(_) | ServerError::Http(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Core(e) => e.is_retryable(),
            ServerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotkeeper_core::{LotId, StoreError, StoreErrorKind};

    #[test]
    fn test_core_error_status_mapping() {
        let cases = [
            (CoreError::InvalidArgument { reason: "x".into() }, 400),
            (CoreError::LotNotFound { lot_id: LotId(1) }, 404),
            (
                CoreError::OccupantNotFound {
                    lot_id: LotId(1),
                    plate: "A".into(),
                },
                404,
            ),
            (CoreError::NoAvailableSpace { lot_id: LotId(1) }, 409),
            (
                CoreError::Persistence(StoreError::new(StoreErrorKind::Io, "disk")),
                500,
            ),
            (CoreError::Internal { reason: "x".into() }, 500),
        ];
        for (err, status) in cases {
            let code = err.error_code();
            let err = ServerError::from(err);
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_request_errors() {
        let err = ServerError::MethodNotAllowed {
            method: "GET".into(),
            path: "/parkVehicle".into(),
        };
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ServerError::RouteNotFound("/nope".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::BodyTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(!ServerError::InvalidRequest("x".into()).is_retryable());
    }
}
