//! Coxswain - coordinates prompt-driven agents over a shared task board
//! and a versioned artifact store.
//!
//! This library provides the core functionality for the `cox` CLI tool:
//! sprint/task tracking with a validated status state machine, blocker
//! handling, agent workload accounting, versioned artifact persistence,
//! and token-budgeted context assembly for agent invocations.

pub mod agents;
pub mod board;
pub mod cli;
pub mod context;
pub mod models;
pub mod runner;

use std::path::PathBuf;

/// Resolve the data directory for coxswain state.
///
/// Honors `COX_DATA_DIR` when set; otherwise defaults to
/// `<platform data dir>/coxswain` (e.g. `~/.local/share/coxswain`).
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("COX_DATA_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::data_dir()
        .map(|d| d.join("coxswain"))
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))
}

/// Library-level error type for coxswain operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid transition from '{from}' to '{to}' (valid: {})", allowed.join(", "))]
    InvalidTransition {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store busy: {0}")]
    Busy(String),

    #[error("Cycle detected in task dependencies")]
    CycleDetected,

    #[error("Model capability error: {0}")]
    Capability(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg) => match err.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    Error::Busy(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    Error::ConstraintViolation(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                _ => Error::Other(e.to_string()),
            },
            _ => Error::Other(e.to_string()),
        }
    }
}

impl Error {
    /// Whether a caller should treat this failure as transient and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}

/// Result type alias for coxswain operations.
pub type Result<T> = std::result::Result<T, Error>;
