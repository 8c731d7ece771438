//! Batch orchestrator
//!
//! Runs fetch over the whole batch, then conversion over the whole staging
//! directory, and folds both into one [`BatchReport`]. Nothing here returns
//! an error: session-level failures are logged and turned into item
//! failures or an empty stage result.

use dcm2pdf_common::{PipelineError, Stage};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::Settings;
use crate::convert::{ConversionStage, ExternalConverter};
use crate::fetch::{FetchOutcome, FetchStage, SftpArchive};
use crate::persist::PgArtifactStore;
use crate::source::{BatchSource, PgStudySource};
use crate::types::{identifier_of, BatchReport, ConversionSummary, ItemFailure};

pub struct BatchOrchestrator {
    source: Arc<dyn BatchSource>,
    fetch: FetchStage,
    convert: ConversionStage,
}

impl BatchOrchestrator {
    pub fn new(source: Arc<dyn BatchSource>, fetch: FetchStage, convert: ConversionStage) -> Self {
        Self {
            source,
            fetch,
            convert,
        }
    }

    /// Wire the production collaborators: study table, SFTP, external
    /// converter and `pdf_storage`.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let options = settings.database.connect_options();

        let fetch = FetchStage::from_settings(
            Arc::new(SftpArchive::new(settings.remote.clone())),
            settings,
        )?;
        let convert = ConversionStage::from_settings(
            Arc::new(ExternalConverter::new(settings.converter.executable_path.clone())),
            Arc::new(PgArtifactStore::new(options.clone())),
            settings,
        )?;

        Ok(Self::new(Arc::new(PgStudySource::new(options)), fetch, convert))
    }

    /// Enumerate up to `limit` candidates and fetch them into staging
    #[instrument(skip(self))]
    pub async fn fetch_batch(&self, limit: usize) -> FetchOutcome {
        let items = match self.source.candidates(limit).await {
            Ok(items) => items,
            Err(e) => {
                error!(stage = %Stage::Fetch, error = %e, "Failed to load batch candidates");
                return FetchOutcome::default();
            },
        };

        if items.is_empty() {
            info!("No candidates to fetch");
            return FetchOutcome::default();
        }

        match self.fetch.fetch(&items, limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = PipelineError::connection(e.to_string());
                error!(stage = %Stage::Fetch, error = %err, "Fetch aborted, no files obtained");
                FetchOutcome {
                    artifacts: Vec::new(),
                    failures: items
                        .iter()
                        .take(limit)
                        .map(|item| ItemFailure {
                            identifier: item.identifier.clone(),
                            stage: Stage::Fetch,
                            message: err.to_string(),
                        })
                        .collect(),
                }
            },
        }
    }

    /// Convert everything waiting in the staging directory
    #[instrument(skip(self))]
    pub async fn convert_pending(&self) -> ConversionSummary {
        match self.convert.convert_all(self.fetch.staging_dir()).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(stage = %Stage::Convert, error = %e, "Cannot read staging directory");
                ConversionSummary::default()
            },
        }
    }

    /// Fetch, then convert, then tally.
    ///
    /// Converted items are reported in manifest order. Sources left in
    /// staging by earlier batches come after them, in path order.
    #[instrument(skip(self))]
    pub async fn run_batch(&self, limit: usize) -> BatchReport {
        let fetched = self.fetch_batch(limit).await;
        let converted = self.convert_pending().await;

        let order: Vec<&str> = fetched.artifacts.iter().map(|a| a.identifier.as_str()).collect();
        let rank = |identifier: &str| {
            order
                .iter()
                .position(|id| *id == identifier)
                .unwrap_or(order.len())
        };

        let mut succeeded = converted.succeeded;
        succeeded.sort_by_key(|path| rank(&identifier_of(path)));
        let mut conversion_failures = converted.failures;
        conversion_failures.sort_by_key(|failure| rank(&failure.identifier));

        let mut report = BatchReport {
            succeeded,
            failed: fetched.failures,
        };
        report.failed.extend(conversion_failures);

        info!(
            processed = report.processed(),
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            "Batch finished"
        );

        report
    }
}
