//! Churn Ingest - load customers, events and churn labels from CSV

use churn_common::config::DatabaseConfig;
use churn_common::logging::{init_logging, LogConfig, LogLevel};
use churn_ingest::config::DEFAULT_DATA_DIR;
use churn_ingest::{IngestConfig, IngestPipeline, IngestSummary};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "churn-ingest")]
#[command(author, version, about = "Load churn CSV files into Postgres")]
struct Cli {
    /// Directory holding customers.csv, events.csv and churn_labels.csv
    #[arg(long, env = "CHURN_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Truncate events and churn labels before loading
    #[arg(long)]
    full_refresh: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::default()
        .with_level(log_level)
        .with_file_prefix("churn-ingest");
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring LOG_* settings: {e}");
            log_config
        },
    };

    // Ingestion still runs if logging cannot be set up
    let log_guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    let result = run(&cli).await;

    match result {
        Ok(summary) => {
            println!("{summary}");
        },
        Err(e) => {
            error!(error = %e, "Ingest failed");
            drop(log_guard);
            eprintln!("Error: {e}");
            process::exit(1);
        },
    }
}

async fn run(cli: &Cli) -> anyhow::Result<IngestSummary> {
    let database = DatabaseConfig::from_env()?;
    let config = IngestConfig::new(&cli.data_dir, database).with_full_refresh(cli.full_refresh);

    info!(
        data_dir = %config.data_dir.display(),
        full_refresh = config.full_refresh,
        "Starting ingest"
    );

    let summary = IngestPipeline::new(config)?.run().await?;
    Ok(summary)
}
