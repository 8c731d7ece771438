//! Pipeline data model

use chrono::NaiveDateTime;
use dcm2pdf_common::Stage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One unit of work: a study file at the archive and its accession number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    /// Path of the file relative to the archive root
    pub remote_locator: String,
    /// Stable external key (accession number) naming every derived artifact
    pub identifier: String,
}

impl BatchItem {
    pub fn new(remote_locator: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            remote_locator: remote_locator.into(),
            identifier: identifier.into(),
        }
    }
}

/// A source file staged locally by the fetch stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub identifier: String,
}

impl LocalArtifact {
    pub fn source(path: PathBuf, identifier: impl Into<String>) -> Self {
        Self {
            path,
            identifier: identifier.into(),
        }
    }
}

/// Per-file result of the conversion stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(PathBuf),
    Failed(String),
}

/// A stored document row in `pdf_storage`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersistedRecord {
    pub id: i32,
    pub filename: String,
    /// Base64-encoded document bytes
    pub file_content: String,
    pub status: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Outcome of converting the whole staging directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Converted document paths, in processing order
    pub succeeded: Vec<PathBuf>,
    /// Source paths whose conversion failed, in processing order
    pub failed: Vec<PathBuf>,
    /// Diagnostics for `failed`, same order
    pub failures: Vec<ItemFailure>,
}

impl ConversionSummary {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// One item that dropped out of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub identifier: String,
    pub stage: Stage,
    pub message: String,
}

/// Aggregate result of one orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Converted document paths, in processing order
    pub succeeded: Vec<PathBuf>,
    /// Failed items, in the order they failed
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn processed(&self) -> usize {
        self.succeeded_count() + self.failed_count()
    }

    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.identifier.as_str()).collect()
    }

    pub fn record_failure(&mut self, identifier: &str, stage: Stage, message: impl Into<String>) {
        self.failed.push(ItemFailure {
            identifier: identifier.to_string(),
            stage,
            message: message.into(),
        });
    }
}

/// Identifier encoded in an artifact filename (`ACC1.dcm` -> `ACC1`)
pub fn identifier_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
