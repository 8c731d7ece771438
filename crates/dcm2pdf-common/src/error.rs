//! Error types for dcm2pdf

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage an item can fail at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Candidate enumeration and remote transfer
    Fetch,
    /// External converter invocation
    Convert,
    /// Database write of the converted document
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Convert => write!(f, "convert"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

/// Main error type for the pipeline
///
/// Only `Config` is fatal to the process. `Connection` aborts the current
/// stage call and is absorbed by the orchestrator; the per-item variants are
/// recovered inside the stage that raised them.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}. Check the config file or the SECTION_KEY environment overrides.")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transfer of '{identifier}' failed: {message}")]
    Transfer { identifier: String, message: String },

    #[error("Conversion of '{path}' failed: {message}")]
    Conversion { path: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Stage this error belongs to, if it is tied to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Transfer { .. } => Some(Stage::Fetch),
            PipelineError::Conversion { .. } => Some(Stage::Convert),
            PipelineError::Persistence(_) => Some(Stage::Persist),
            PipelineError::Config(_) | PipelineError::Connection(_) | PipelineError::Io(_) => None,
        }
    }

    /// Whether the process should stop on this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }
}
