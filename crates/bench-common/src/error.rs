//! Error types for tile-bench.

use thiserror::Error;

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;

/// Primary error type for benchmark sessions and reports.
///
/// Only conditions that prevent producing any output end up here. A missing
/// metric or a failed load-generator run is represented in the data model
/// instead.
#[derive(Debug, Error)]
pub enum BenchError {
    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid layer catalog: {0}")]
    InvalidCatalog(String),

    // === Session Errors ===
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session '{id}' could not be read: {message}")]
    SessionCorrupt { id: String, message: String },

    #[error("Session already exists: {0}")]
    SessionExists(String),

    // === Load Generator Errors ===
    #[error("Load generator could not be started: {0}")]
    LoadGenerator(String),

    #[error("Capabilities request failed: {0}")]
    Capabilities(String),

    // === Report Errors ===
    #[error("Report could not be written: {0}")]
    ReportWrite(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BenchError {
    /// Process exit code for this error when surfaced by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::InvalidConfig(_) | BenchError::InvalidCatalog(_) => 2,
            BenchError::SessionNotFound(_) => 3,
            BenchError::SessionCorrupt { .. } => 4,
            BenchError::LoadGenerator(_) | BenchError::Capabilities(_) => 5,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Serialization(format!("JSON error: {}", err))
    }
}
