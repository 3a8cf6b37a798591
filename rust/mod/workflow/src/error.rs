use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_core::{error_code, error_response, ServiceError};
use thiserror::Error;

use crate::model::{TaskAction, TaskRef, TaskStatus};

/// Errors returned by task operations.
///
/// Every variant carries the offending task id so callers can render an
/// actionable message; [`TaskError::SequenceViolation`] also names the
/// predecessor that must be finished first.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("task {task_id} not found")]
    NotFound { task_id: String },

    #[error("task {task_id}: {message}")]
    Validation { task_id: String, message: String },

    #[error("cannot {action} task {task_id} while it is {status}")]
    InvalidState {
        task_id: String,
        status: TaskStatus,
        action: TaskAction,
    },

    #[error("task {task_id} cannot start before task {blocking} is completed or skipped")]
    SequenceViolation { task_id: String, blocking: TaskRef },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TaskError {
    pub fn validation(task_id: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            task_id: task_id.to_string(),
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => error_code::NOT_FOUND,
            Self::Validation { .. } => error_code::VALIDATION_FAILED,
            Self::InvalidState { .. } => error_code::INVALID_STATE,
            Self::SequenceViolation { .. } => error_code::SEQUENCE_VIOLATION,
            Self::Service(e) => e.error_code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidState { .. } | Self::SequenceViolation { .. } => StatusCode::CONFLICT,
            Self::Service(e) => e.status_code(),
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Self::NotFound { task_id } | Self::Validation { task_id, .. } => {
                serde_json::json!({ "taskId": task_id })
            }
            Self::InvalidState {
                task_id,
                status,
                action,
            } => serde_json::json!({
                "taskId": task_id,
                "status": status,
                "action": action.as_str(),
            }),
            Self::SequenceViolation { task_id, blocking } => serde_json::json!({
                "taskId": task_id,
                "blockingTask": blocking,
            }),
            Self::Service(_) => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        error_response(
            self.status_code(),
            self.error_code(),
            self.to_string(),
            self.details(),
        )
    }
}
