//! dcm2pdf - batch conversion of archived DICOM studies to PDF
//!
//! # Overview
//!
//! A batch moves through three stages, strictly one item at a time:
//!
//! - **Fetch**: copy study files from the remote archive over one SFTP
//!   session into the local staging directory (`fetch`)
//! - **Convert**: run the external converter on every staged file (`convert`)
//! - **Persist**: store each converted document, base64-encoded, in
//!   `pdf_storage` (`persist`)
//!
//! [`orchestrator::BatchOrchestrator`] sequences the stages and reports
//! which items made it through. A failing item never aborts the batch.
//!
//! # Example
//!
//! ```no_run
//! use dcm2pdf::config::{ConfigResolver, Settings};
//! use dcm2pdf::orchestrator::BatchOrchestrator;
//!
//! # async fn demo() -> dcm2pdf_common::Result<()> {
//! let settings = Settings::from_resolver(&ConfigResolver::load(None)?)?;
//! let orchestrator = BatchOrchestrator::from_settings(&settings)?;
//!
//! let report = orchestrator.run_batch(settings.pipeline.batch_limit).await;
//! println!("{} converted, {} failed", report.succeeded_count(), report.failed_count());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod config;
pub mod convert;
pub mod fetch;
pub mod naming;
pub mod orchestrator;
pub mod persist;
pub mod source;
pub mod types;

pub use orchestrator::BatchOrchestrator;
pub use types::{BatchItem, BatchReport, ConversionSummary, ItemFailure};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dcm2pdf - fetch archived studies, convert them to PDF and store them
#[derive(Parser, Debug)]
#[command(name = "dcm2pdf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute; interactive menu when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// INI configuration file (defaults to config/config.ini)
    #[arg(short, long, env = "DCM2PDF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, convert and store one batch
    Run {
        /// Maximum number of items (defaults to pipeline.batch_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the batch report as JSON instead of a tally
        #[arg(long)]
        json: bool,
    },

    /// Create the database if missing, then the pdf_storage table and its indexes
    InitDb,
}
