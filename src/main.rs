mod config;
mod data;
mod error;
mod jobs;
mod retry;
mod storage;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use config::PipelineConfig;
use dotenv::dotenv;
use retry::{Backoff, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stock-news-pipeline",
    about = "Batch ingestion and cleaning of intraday quotes and news articles"
)]
struct Cli {
    /// Path to the JSON config file. Defaults to $PIPELINE_CONFIG, then /app/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database connection attempts before giving up.
    #[arg(long, global = true, default_value_t = 5)]
    connect_attempts: u32,

    /// Seconds to wait between connection attempts (initial delay when exponential).
    #[arg(long, global = true, default_value_t = 5)]
    connect_delay_secs: u64,

    /// Delay schedule between connection attempts.
    #[arg(long, global = true, value_enum, default_value_t = BackoffKind::Fixed)]
    connect_backoff: BackoffKind,

    /// Upper bound on the delay, in seconds, for exponential backoff.
    #[arg(long, global = true, default_value_t = 60)]
    connect_max_delay_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one page of quotes and news and append them to the raw tables.
    Ingest,
    /// Rebuild the cleaned tables from the raw tables.
    Transform,
}

/// Builds the connection retry policy from the `--connect-*` flags.
fn retry_policy(cli: &Cli) -> RetryPolicy {
    let delay = Duration::from_secs(cli.connect_delay_secs);
    let backoff = match cli.connect_backoff {
        BackoffKind::Fixed => Backoff::Fixed(delay),
        BackoffKind::Exponential => Backoff::Exponential {
            initial: delay,
            max: Duration::from_secs(cli.connect_max_delay_secs).max(delay),
        },
    };

    RetryPolicy::new(cli.connect_attempts, backoff)
}

/// Entry point for both batch jobs.
///
/// Loads `.env`, initializes logging, builds the configuration once and
/// hands it to the selected job. Any job error exits non-zero with the full
/// error chain.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let policy = retry_policy(&cli);

    let config_path = PipelineConfig::resolve_path(cli.config);
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    match cli.command {
        Commands::Ingest => {
            let summary = jobs::ingest::run(&config, &policy)
                .await
                .context("ingestion job failed")?;
            info!(
                "Ingestion complete: {} stock rows, {} news rows",
                summary.stock_rows, summary.news_rows
            );
        }
        Commands::Transform => {
            let summary = jobs::transform::run(&config, &policy)
                .await
                .context("transformation job failed")?;
            info!(
                "Transformation complete: {} cleaned stock rows ({} duplicates dropped), \
                 {} cleaned news rows ({} duplicates dropped)",
                summary.stock_rows_written,
                summary.stock.duplicates_removed,
                summary.news_rows_written,
                summary.news.duplicates_removed
            );
        }
    }

    Ok(())
}
