//! Error types for nudge-core operations.
//!
//! The state machine itself never fails: precondition misses are no-ops and
//! malformed input is normalized. Errors here cover the edges around it
//! (configuration files, serialization, export).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // ─────────────────────────────────────────────────────────────────────
    // Serialization Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, NudgeError>;
