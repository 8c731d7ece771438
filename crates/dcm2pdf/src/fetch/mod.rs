//! Remote fetch stage
//!
//! Pulls one batch of study files from the archive into the staging
//! directory over a single remote session. A failed transfer only drops that
//! item; only a failure to open the session fails the whole call.

pub mod sftp;

use async_trait::async_trait;
use dcm2pdf_common::{PipelineError, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use crate::naming;
use crate::types::{BatchItem, ItemFailure, LocalArtifact};

pub use sftp::SftpArchive;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The remote session could not be established
    #[error("Failed to open remote session: {0}")]
    Connection(String),

    /// A single file could not be transferred
    #[error("{0}")]
    Transfer(String),

    #[error("Invalid identifier '{0}': must be a plain file name")]
    InvalidIdentifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Attribute this error to one batch item
    pub fn for_item(self, identifier: &str) -> PipelineError {
        match self {
            FetchError::Connection(msg) => PipelineError::connection(msg),
            other => PipelineError::Transfer {
                identifier: identifier.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Source archive that can open authenticated sessions
#[async_trait]
pub trait RemoteArchive: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, FetchError>;
}

/// One open session against the archive
#[async_trait]
pub trait RemoteSession: Send {
    /// Copy `remote_path` to `local_path`, returning the number of bytes written
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, FetchError>;

    /// End the session. Called exactly once per opened session.
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

/// Result of one fetch call
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Files actually obtained, in processing order
    pub artifacts: Vec<LocalArtifact>,
    /// Items that were skipped, in processing order
    pub failures: Vec<ItemFailure>,
}

pub struct FetchStage {
    archive: Arc<dyn RemoteArchive>,
    archive_root: String,
    staging_dir: PathBuf,
    source_extension: String,
}

impl FetchStage {
    /// Create the stage, creating the staging directory if needed
    pub fn new(
        archive: Arc<dyn RemoteArchive>,
        archive_root: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
        source_extension: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir)?;

        Ok(Self {
            archive,
            archive_root: archive_root.into(),
            staging_dir,
            source_extension: source_extension.into(),
        })
    }

    pub fn from_settings(
        archive: Arc<dyn RemoteArchive>,
        settings: &Settings,
    ) -> Result<Self, PipelineError> {
        Self::new(
            archive,
            settings.remote.archive_root.clone(),
            settings.paths.download_directory.clone(),
            settings.pipeline.source_extension.clone(),
        )
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetch up to `limit` items over one session.
    ///
    /// The session is closed once whatever happens to the individual
    /// transfers.
    #[instrument(skip_all, fields(items = items.len(), limit = limit))]
    pub async fn fetch(&self, items: &[BatchItem], limit: usize) -> Result<FetchOutcome, FetchError> {
        let mut session = self.archive.open_session().await?;
        debug!("Remote session opened");

        let outcome = self.transfer_all(session.as_mut(), items, limit).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close remote session cleanly");
        }

        info!(
            fetched = outcome.artifacts.len(),
            failed = outcome.failures.len(),
            "Fetch finished"
        );

        Ok(outcome)
    }

    async fn transfer_all(
        &self,
        session: &mut dyn RemoteSession,
        items: &[BatchItem],
        limit: usize,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        for item in items.iter().take(limit) {
            match self.transfer_one(session, item).await {
                Ok(artifact) => outcome.artifacts.push(artifact),
                Err(e) => {
                    let err = e.for_item(&item.identifier);
                    let stage = err.stage().unwrap_or(Stage::Fetch);
                    error!(
                        identifier = %item.identifier,
                        remote_locator = %item.remote_locator,
                        stage = %stage,
                        error = %err,
                        "Transfer failed, skipping item"
                    );
                    outcome.failures.push(ItemFailure {
                        identifier: item.identifier.clone(),
                        stage,
                        message: err.to_string(),
                    });
                },
            }
        }

        outcome
    }

    async fn transfer_one(
        &self,
        session: &mut dyn RemoteSession,
        item: &BatchItem,
    ) -> Result<LocalArtifact, FetchError> {
        if !naming::is_safe_identifier(&item.identifier) {
            return Err(FetchError::InvalidIdentifier(item.identifier.clone()));
        }

        let remote_path = naming::remote_path(&self.archive_root, &item.remote_locator);
        let local_path =
            naming::local_source_path(&self.staging_dir, &item.identifier, &self.source_extension);
        let part_path = naming::partial_path(&local_path);

        // the staged source is only replaced once the new copy is complete
        let result = match session.download(&remote_path, &part_path).await {
            Ok(bytes) => std::fs::rename(&part_path, &local_path)
                .map(|()| bytes)
                .map_err(FetchError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                info!(identifier = %item.identifier, path = %local_path.display(), bytes, "Downloaded");
                Ok(LocalArtifact::source(local_path, item.identifier.clone()))
            },
            Err(e) => {
                if part_path.exists() {
                    if let Err(rm) = std::fs::remove_file(&part_path) {
                        warn!(path = %part_path.display(), error = %rm, "Failed to remove partial download");
                    }
                }
                Err(e)
            },
        }
    }
}
