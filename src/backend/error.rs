//! Backend-specific error types.
//!
//! Backend failures never abort a save or restore; they are logged and folded
//! into the owning monitor set's status.

use thiserror::Error;

/// Errors that can occur in a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// File or stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// `write_data`/`read_data`/`end_*` called without a matching `begin_*`.
    #[error("backend '{0}' has no open transaction")]
    NotOpen(String),

    /// The backend does not support the requested direction.
    #[error("backend '{name}' does not support {operation}")]
    Unsupported { name: String, operation: &'static str },

    /// Store content is structurally invalid.
    #[error("invalid store format: {0}")]
    Format(String),
}
