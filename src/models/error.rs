//! Error types for preftune.
//!
//! One variant per failure class of the pipeline. Nothing is caught or
//! retried internally; every error propagates to the binary and aborts the
//! run.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for preftune.
#[derive(Debug, Error)]
pub enum PreftuneError {
    #[error("Input dataset not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        source: std::io::Error,
    },

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Training failure: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PreftuneError {
    /// Storage error tagged with the operation that failed.
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Model load error with a formatted reason.
    pub fn model_load(reason: impl Into<String>) -> Self {
        Self::ModelLoad(reason.into())
    }

    /// Training failure with a formatted reason.
    pub fn training(reason: impl Into<String>) -> Self {
        Self::Training(reason.into())
    }
}

/// Result type alias for preftune operations.
pub type Result<T> = std::result::Result<T, PreftuneError>;
