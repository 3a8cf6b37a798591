use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_core::{error_code, error_response, ServiceError};
use thiserror::Error;

use crate::model::{BatchAction, BatchStatus};

/// Errors returned by RMA batch operations.
///
/// All of them are raised before anything is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("RMA batch {batch_id} not found")]
    NotFound { batch_id: String },

    #[error("batch {batch_id} has no product entry '{entry}'")]
    EntryNotFound { batch_id: String, entry: String },

    #[error("batch {batch_id}: {message}")]
    Validation { batch_id: String, message: String },

    #[error("cannot {action} batch {batch_id} while it is {status}")]
    InvalidState {
        batch_id: String,
        status: BatchStatus,
        action: BatchAction,
    },

    #[error("batch {batch_id} has no products and cannot be finalized")]
    EmptyBatch { batch_id: String },

    #[error("serial {serial_number} is already in batch {batch_id}")]
    DuplicateSerial {
        batch_id: String,
        serial_number: String,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl BatchError {
    pub fn validation(batch_id: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            batch_id: batch_id.to_string(),
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::EntryNotFound { .. } => error_code::NOT_FOUND,
            Self::Validation { .. } => error_code::VALIDATION_FAILED,
            Self::InvalidState { .. } => error_code::INVALID_STATE,
            Self::EmptyBatch { .. } => error_code::EMPTY_BATCH,
            Self::DuplicateSerial { .. } => error_code::ALREADY_EXISTS,
            Self::Service(e) => e.error_code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::EntryNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidState { .. } | Self::DuplicateSerial { .. } => StatusCode::CONFLICT,
            Self::EmptyBatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Service(e) => e.status_code(),
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Self::NotFound { batch_id }
            | Self::Validation { batch_id, .. }
            | Self::EmptyBatch { batch_id } => serde_json::json!({ "batchId": batch_id }),
            Self::EntryNotFound { batch_id, entry } => {
                serde_json::json!({ "batchId": batch_id, "entry": entry })
            }
            Self::InvalidState {
                batch_id,
                status,
                action,
            } => serde_json::json!({
                "batchId": batch_id,
                "status": status,
                "action": action.as_str(),
            }),
            Self::DuplicateSerial {
                batch_id,
                serial_number,
            } => serde_json::json!({ "batchId": batch_id, "serialNumber": serial_number }),
            Self::Service(_) => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        error_response(
            self.status_code(),
            self.error_code(),
            self.to_string(),
            self.details(),
        )
    }
}
