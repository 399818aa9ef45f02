//! Error types for mala

use std::path::PathBuf;

use thiserror::Error;

/// Convenience Result type for mala operations
pub type Result<T> = std::result::Result<T, MalaError>;

#[derive(Error, Debug)]
pub enum MalaError {
    #[error("Unknown tool in toolchain entry: {0}")]
    UnknownTool(String),

    #[error("Empty toolchain entry")]
    EmptyToolSpec,

    #[error("Unusable output from {tool}: {reason}")]
    ToolOutput { tool: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetryExhausted { attempts: u32, source: sqlx::Error },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("No files to process")]
    NoFiles,

    #[error("{failed} of {spawned} workers failed")]
    WorkersFailed { failed: usize, spawned: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}
