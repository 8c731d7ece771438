//! dcm2pdf - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use dcm2pdf::config::{ConfigResolver, Settings};
use dcm2pdf::{commands, Cli, Commands};
use dcm2pdf_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Both)
        .log_file_prefix("dcm2pdf")
        .build();

    // Environment variables take precedence over flags
    let _guard = match log_config.with_env().and_then(|config| init_logging(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            process::exit(1);
        },
    };

    if let Err(e) = execute(&cli).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute(cli: &Cli) -> Result<()> {
    let resolver =
        ConfigResolver::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::from_resolver(&resolver).context("Invalid configuration")?;

    info!(
        config = ?resolver.source(),
        host = %settings.remote.host,
        database = %settings.database.database,
        "Configuration loaded"
    );

    match cli.command {
        None => commands::interactive(&settings).await?,
        Some(Commands::Run { limit, json }) => commands::run(&settings, limit, json).await?,
        Some(Commands::InitDb) => commands::init_db(&settings).await?,
    }

    Ok(())
}
