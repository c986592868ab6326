// ABOUTME: CLI entry point for drift-sync
// ABOUTME: Parses flags, resolves credentials, and runs the reconciliation

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use drift_sync::checkpoint::DEFAULT_STATE_PATH;
use drift_sync::config::{SyncConfig, DEFAULT_CONFIG_PATH};
use drift_sync::credentials::Credentials;
use drift_sync::run::{run, RunOptions};
use drift_sync::sink::SinkClient;
use drift_sync::source::SourceClient;
use drift_sync::writer::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(name = "drift-sync")]
#[command(about = "Incremental record reconciliation: insert new source records into the sink and report field-level drift", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the sync configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Path to the checkpoint state file
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,
    /// Compute and report everything without writing to the sink or the
    /// checkpoint file
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    dry_run: bool,
    /// Maximum rows per sink insert call
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Unrecognized trailing arguments; warned about and ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    extra: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG has precedence over --log, which defaults to "info"
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    for arg in &cli.extra {
        tracing::warn!("Ignoring unrecognized argument: {}", arg);
    }

    let config = SyncConfig::load(&cli.config).await?;
    let credentials = Credentials::from_env(config.source_base.as_deref())?;

    let source = SourceClient::new(&credentials).context("Failed to set up the source client")?;
    let sink = SinkClient::new(&credentials).context("Failed to set up the sink client")?;

    let options = RunOptions {
        dry_run: cli.dry_run,
        chunk_size: cli.chunk_size,
        state_path: cli.state,
    };

    if options.dry_run {
        tracing::info!("Running in dry-run mode: no sink inserts, no checkpoint writes");
    }

    let summary = run(&config, &source, &sink, &options).await?;
    println!("{}", summary);

    Ok(())
}
