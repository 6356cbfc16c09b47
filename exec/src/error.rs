use std::io;

use thiserror::Error;

/// Errors raised by an [`crate::adapter::ExecutionAdapter`] implementation or
/// the checkpoint manager that wraps it.
///
/// `NotFound`/`InvalidEdit`/`AmbiguousEdit` are business-logic failures a tool
/// turns into a `ToolResult::Err` so the model can recover; `Backend` and
/// `Io` indicate the adapter itself is unusable and should propagate up to a
/// fatal driver error.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{0}: not found")]
    NotFound(String),

    #[error("search text did not match exactly once in {path} (found {count} occurrences)")]
    AmbiguousEdit { path: String, count: usize },

    #[error("refusing to overwrite {0} without overwrite=true")]
    OverwriteRefused(String),

    #[error("{0} has not been read this session; read it before writing")]
    ReadBeforeWriteViolation(String),

    #[error("command timed out after {0}ms")]
    Timeout(u64),

    #[error("execution cancelled")]
    Cancelled,

    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
