//! Conversion stage
//!
//! Converts every source file in the staging directory, one at a time, and
//! hands each converted document to the persistence stage. A failed
//! conversion only lands the file in the failure list. A failed database
//! write is logged but does not undo the conversion.

pub mod external;

use async_trait::async_trait;
use base64::Engine;
use dcm2pdf_common::{PipelineError, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::Settings;
use crate::naming;
use crate::persist::ArtifactStore;
use crate::types::{identifier_of, ConversionOutcome, ConversionSummary, ItemFailure};

pub use external::ExternalConverter;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// The converter process could not be started
    #[error("Failed to launch converter '{executable}': {message}")]
    Launch { executable: String, message: String },

    /// The converter ran and exited non-zero
    #[error("Converter exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("Cannot derive output name for '{0}'")]
    Naming(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

impl ConversionError {
    fn into_pipeline(self, source: &Path) -> PipelineError {
        PipelineError::Conversion {
            path: source.display().to_string(),
            message: self.to_string(),
        }
    }
}

/// Turns one source file into one document
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, source: &Path, destination: &Path) -> Result<(), ConversionError>;
}

pub struct ConversionStage {
    converter: Arc<dyn Converter>,
    store: Arc<dyn ArtifactStore>,
    output_dir: PathBuf,
    source_extension: String,
    target_extension: String,
}

impl ConversionStage {
    /// Create the stage, creating the output directory if needed
    pub fn new(
        converter: Arc<dyn Converter>,
        store: Arc<dyn ArtifactStore>,
        output_dir: impl Into<PathBuf>,
        source_extension: impl Into<String>,
        target_extension: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            converter,
            store,
            output_dir,
            source_extension: source_extension.into(),
            target_extension: target_extension.into(),
        })
    }

    pub fn from_settings(
        converter: Arc<dyn Converter>,
        store: Arc<dyn ArtifactStore>,
        settings: &Settings,
    ) -> Result<Self, PipelineError> {
        Self::new(
            converter,
            store,
            settings.paths.output_directory.clone(),
            settings.pipeline.source_extension.clone(),
            settings.pipeline.target_extension.clone(),
        )
    }

    /// Source files waiting in `staging_dir`, sorted by path
    pub fn pending_sources(&self, staging_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut sources = Vec::new();
        for entry in std::fs::read_dir(staging_dir)? {
            let path = entry?.path();
            if path.is_file() && naming::has_extension(&path, &self.source_extension) {
                sources.push(path);
            }
        }
        sources.sort();
        Ok(sources)
    }

    /// Convert every source file in `staging_dir`, in path order.
    ///
    /// The staging directory carries no manifest, so results follow file
    /// names; `BatchOrchestrator::run_batch` restores manifest order.
    /// An empty directory yields an empty summary without touching the
    /// converter. Only an unreadable staging directory is an error.
    #[instrument(skip_all, fields(staging_dir = %staging_dir.display()))]
    pub async fn convert_all(&self, staging_dir: &Path) -> Result<ConversionSummary, PipelineError> {
        let sources = self.pending_sources(staging_dir)?;
        let mut summary = ConversionSummary::default();

        if sources.is_empty() {
            info!("No source files to convert");
            return Ok(summary);
        }

        info!(total = sources.len(), "Converting staged files");

        for source in sources {
            match self.convert_one(&source).await {
                ConversionOutcome::Converted(path) => {
                    self.persist_converted(&path).await;
                    summary.succeeded.push(path);
                },
                ConversionOutcome::Failed(reason) => {
                    let identifier = identifier_of(&source);
                    error!(
                        identifier = %identifier,
                        path = %source.display(),
                        stage = %Stage::Convert,
                        error = %reason,
                        "Conversion failed"
                    );
                    summary.failures.push(ItemFailure {
                        identifier,
                        stage: Stage::Convert,
                        message: reason,
                    });
                    summary.failed.push(source);
                },
            }
        }

        info!(
            processed = summary.processed(),
            converted = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Conversion finished"
        );

        Ok(summary)
    }

    /// Convert one source file; exit status decides the outcome
    pub async fn convert_one(&self, source: &Path) -> ConversionOutcome {
        let Some(destination) = naming::converted_path(source, &self.output_dir, &self.target_extension)
        else {
            let err = ConversionError::Naming(source.display().to_string());
            return ConversionOutcome::Failed(err.into_pipeline(source).to_string());
        };

        match self.converter.convert(source, &destination).await {
            Ok(()) => {
                info!(source = %source.display(), destination = %destination.display(), "Converted");
                ConversionOutcome::Converted(destination)
            },
            Err(e) => ConversionOutcome::Failed(e.into_pipeline(source).to_string()),
        }
    }

    async fn persist_converted(&self, path: &Path) {
        let identifier = identifier_of(path);

        let filename = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                warn!(path = %path.display(), "Converted path has no file name, not persisting");
                return;
            },
        };

        let encoded = match tokio::fs::read(path).await {
            Ok(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
            Err(e) => {
                error!(identifier = %identifier, stage = %Stage::Persist, error = %e, "Failed to read converted file");
                return;
            },
        };

        if let Err(e) = self.store.persist(&filename, &encoded).await {
            error!(identifier = %identifier, stage = %Stage::Persist, error = %e, "Failed to persist document");
        }
    }
}
