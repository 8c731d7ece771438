//! CLI command implementations
//!
//! Each action prints a colored tally: processed, succeeded, failed and the
//! identifiers that failed.

use colored::Colorize;
use dcm2pdf_common::{PipelineError, Result};
use inquire::{CustomType, InquireError, Select};
use std::fmt;
use tracing::{error, info};

use crate::config::Settings;
use crate::orchestrator::BatchOrchestrator;
use crate::persist::schema;
use crate::types::{BatchReport, ItemFailure};

/// Actions offered by the interactive menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    FetchBatch,
    ConvertPending,
    RunBatch,
    Exit,
}

impl MenuAction {
    pub const ALL: [MenuAction; 4] = [
        MenuAction::FetchBatch,
        MenuAction::ConvertPending,
        MenuAction::RunBatch,
        MenuAction::Exit,
    ];
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuAction::FetchBatch => "Fetch batch",
            MenuAction::ConvertPending => "Convert all pending",
            MenuAction::RunBatch => "Run full batch",
            MenuAction::Exit => "Exit",
        };
        f.write_str(label)
    }
}

/// `dcm2pdf run`
pub async fn run(settings: &Settings, limit: Option<usize>, json: bool) -> Result<()> {
    let limit = check_limit(limit.unwrap_or(settings.pipeline.batch_limit))?;
    let orchestrator = BatchOrchestrator::from_settings(settings)?;

    let report = orchestrator.run_batch(limit).await;
    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
        println!("{}", rendered);
    } else {
        print_report_paths(&report);
        print_tally("Batch", report.succeeded_count(), &report.failed);
    }
    Ok(())
}

/// `dcm2pdf init-db`
pub async fn init_db(settings: &Settings) -> Result<()> {
    let options = settings.database.connect_options();

    if schema::ensure_database(&options, &settings.database.database).await? {
        println!("{} Created database {}", "✓".green(), settings.database.database);
    }
    schema::apply(&options).await?;
    println!(
        "{} Table pdf_storage ready on {}:{}/{}",
        "✓".green(),
        settings.database.host,
        settings.database.port,
        settings.database.database
    );
    Ok(())
}

/// Menu loop; returns when the operator picks Exit or cancels the prompt.
/// Fails when there is no terminal to prompt on.
pub async fn interactive(settings: &Settings) -> Result<()> {
    let orchestrator = BatchOrchestrator::from_settings(settings)?;

    loop {
        println!();
        let action = match Select::new("What would you like to do?", MenuAction::ALL.to_vec()).prompt() {
            Ok(action) => action,
            Err(e) => {
                prompt_ended(e)?;
                break;
            },
        };

        match action {
            MenuAction::FetchBatch => {
                let Some(limit) = prompt_limit(settings.pipeline.batch_limit) else {
                    continue;
                };
                let outcome = orchestrator.fetch_batch(limit).await;
                print_tally("Fetch", outcome.artifacts.len(), &outcome.failures);
            },
            MenuAction::ConvertPending => {
                let summary = orchestrator.convert_pending().await;
                print_tally("Conversion", summary.succeeded.len(), &summary.failures);
            },
            MenuAction::RunBatch => {
                let Some(limit) = prompt_limit(settings.pipeline.batch_limit) else {
                    continue;
                };
                let report = orchestrator.run_batch(limit).await;
                print_report_paths(&report);
                print_tally("Batch", report.succeeded_count(), &report.failed);
            },
            MenuAction::Exit => break,
        }
    }

    info!("Interactive session ended");
    Ok(())
}

/// Reject a batch limit of zero
pub fn check_limit(limit: usize) -> Result<usize> {
    if limit == 0 {
        return Err(PipelineError::config("batch limit must be greater than 0"));
    }
    Ok(limit)
}

/// Cancelling the menu ends the session; having no terminal is an error.
fn prompt_ended(err: InquireError) -> Result<()> {
    match err {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => Ok(()),
        InquireError::NotTTY => Err(PipelineError::Io(std::io::Error::other(
            "interactive menu needs a terminal, use `dcm2pdf run` instead",
        ))),
        other => Err(PipelineError::Io(std::io::Error::other(other.to_string()))),
    }
}

fn prompt_limit(default: usize) -> Option<usize> {
    let answer = CustomType::<usize>::new("How many studies?")
        .with_default(default)
        .with_error_message("Please enter a positive whole number")
        .prompt();

    match answer {
        Ok(limit) => match check_limit(limit) {
            Ok(limit) => Some(limit),
            Err(_) => {
                println!("{} Batch limit must be greater than 0", "!".yellow());
                None
            },
        },
        Err(e) => {
            error!(error = %e, "Limit prompt aborted");
            None
        },
    }
}

fn print_report_paths(report: &BatchReport) {
    for path in &report.succeeded {
        println!("  {} {}", "✓".green(), path.display());
    }
}

/// `label: N processed, N succeeded, N failed`
pub fn tally_line(label: &str, succeeded: usize, failed: &[ItemFailure]) -> String {
    format!(
        "{}: {} processed, {} succeeded, {} failed",
        label,
        succeeded + failed.len(),
        succeeded,
        failed.len()
    )
}

fn print_tally(label: &str, succeeded: usize, failed: &[ItemFailure]) {
    println!();
    let line = tally_line(label, succeeded, failed);
    if failed.is_empty() {
        println!("{} {}", "✓".green(), line.bold());
    } else {
        println!("{} {}", "✗".red(), line.bold());
        for failure in failed {
            println!(
                "  {} [{}] {}",
                failure.identifier.red(),
                failure.stage,
                failure.message.dimmed()
            );
        }
    }
}
