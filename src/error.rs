//! Error types for stageboard
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task or stage, overlapping move)
//! - 4: Operation failed (store rejected or timed out, board unavailable)

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Exit codes for the stageboard CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for stageboard operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Task {0} already has a move in flight")]
    DragInFlight(String),

    // Operation failures (exit code 4)
    #[error("Board unavailable: {0}")]
    BoardUnavailable(String),

    #[error("Couldn't move task {task_id}: {source}")]
    WriteRejected {
        task_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Couldn't move task {task_id}: no response after {timeout_ms}ms")]
    WriteTimeout { task_id: String, timeout_ms: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::UnknownStage(_)
            | Error::DragInFlight(_) => exit_codes::USER_ERROR,

            Error::BoardUnavailable(_)
            | Error::WriteRejected { .. }
            | Error::WriteTimeout { .. }
            | Error::Store(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// True for failures of a single move that left the board usable.
    pub fn is_transient_move_failure(&self) -> bool {
        matches!(
            self,
            Error::WriteRejected { .. } | Error::WriteTimeout { .. } | Error::DragInFlight(_)
        )
    }

    /// Structured fields for JSON error output, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::WriteRejected { task_id, source } => Some(serde_json::json!({
                "task_id": task_id,
                "store_error": source.to_string(),
            })),
            Error::WriteTimeout {
                task_id,
                timeout_ms,
            } => Some(serde_json::json!({
                "task_id": task_id,
                "timeout_ms": timeout_ms,
            })),
            Error::DragInFlight(task_id) | Error::TaskNotFound(task_id) => {
                Some(serde_json::json!({ "task_id": task_id }))
            }
            Error::UnknownStage(stage_id) => Some(serde_json::json!({ "stage_id": stage_id })),
            _ => None,
        }
    }
}

/// Result type alias for stageboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
