//! Docport CLI
//!
//! Migrates a Docmost ZIP export into an Outline instance, preserving
//! document hierarchy and attachments.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use docport::{
    error::Result,
    models::{Config, DocumentStatus, MigrationReport},
    pipeline::run_migration,
    services::{OutlineApi, OutlineClient},
    utils::format_bytes,
};

/// Docmost → Outline migration tool
#[derive(Parser, Debug)]
#[command(name = "docport", version, about = "Migrate a Docmost export to Outline")]
struct Cli {
    /// Path to the Docmost export ZIP file
    #[arg(long = "zip", value_name = "FILE")]
    zip_path: PathBuf,

    /// Outline instance URL (e.g. https://outline.example.com)
    #[arg(long, env = "OUTLINE_URL")]
    outline_url: String,

    /// Outline API key
    #[arg(long, env = "OUTLINE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Existing collection ID (creates a new collection if omitted)
    #[arg(long)]
    collection_id: Option<String>,

    /// Maximum attachment size in megabytes
    #[arg(long, default_value_t = 25)]
    max_file_size: u64,

    /// Path to an optional configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(report) if report.has_failures() => {
            // Partial migration: per-item failures only.
            process::exit(2);
        }
        Ok(_) => {}
        Err(e) => {
            log::error!("Migration failed: {e}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<MigrationReport> {
    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    let base_url = cli.outline_url.trim_end_matches('/');
    let max_upload_bytes = cli.max_file_size * 1024 * 1024;
    let client = OutlineClient::new(base_url, &cli.api_key, max_upload_bytes, &config.client)?;

    log::info!("Connecting to {base_url}...");
    let user = client.verify_auth().await?;
    log::info!("Connected as {user}");
    log::info!(
        "Max attachment size: {}",
        format_bytes(max_upload_bytes)
    );

    let report = run_migration(
        &client,
        &config,
        &cli.zip_path,
        cli.collection_id.as_deref(),
    )
    .await?;

    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &MigrationReport) {
    log::info!("Collection ID: {}", report.collection_id);
    log::info!("Documents created: {}", report.stats.documents_created);
    log::info!("Attachments uploaded: {}", report.stats.attachments_uploaded);
    log::info!(
        "Total attachment size: {}",
        format_bytes(report.stats.total_attachment_bytes)
    );

    for outcome in report.failures() {
        match outcome.status {
            DocumentStatus::Failed | DocumentStatus::Skipped => {
                log::warn!(
                    "{}: {}",
                    outcome.source_id,
                    outcome.error.as_deref().unwrap_or("unknown failure")
                );
            }
            DocumentStatus::CreatedWithAttachmentFailures => {
                for failure in &outcome.attachment_failures {
                    log::warn!("{}: attachment {}: {}", outcome.source_id, failure.path, failure.reason);
                }
            }
            DocumentStatus::Created => {}
        }
    }
}
