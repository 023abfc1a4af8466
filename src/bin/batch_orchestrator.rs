//! # Batch Orchestrator CLI
//!
//! `partition` turns a work list into batch JSON; `run` drives those batches
//! through the executor and writes the orchestration report.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use batch_orchestrator::client::{GitHubClient, GitHubClientConfig};
use batch_orchestrator::config::ConfigManager;
use batch_orchestrator::logging::{get_environment, init_structured_logging, log_error};
use batch_orchestrator::models::{Batch, JobMetadata};
use batch_orchestrator::orchestration::{parse_work_items, partition, BatchController};

#[derive(Parser)]
#[command(name = "batch-orchestrator")]
#[command(about = "Run repository migrations as sequential batches")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: ORCHESTRATOR_ENV, then APP_ENV, then development)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a work list into batches and print them as JSON
    Partition {
        /// Work list file (JSON array or free text), or `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Repositories per batch (default: orchestration.batch_size)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// JSON file with the job metadata copied into every batch
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },

    /// Dispatch batches one at a time and wait for each to finish
    Run {
        /// Batch JSON produced by `partition`
        #[arg(short, long)]
        batches: PathBuf,

        /// Where to write the orchestration report (default: stdout)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let environment = cli.environment.clone().unwrap_or_else(get_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Partition {
            input,
            batch_size,
            metadata,
        } => {
            let size = batch_size.unwrap_or(manager.config().orchestration.batch_size);
            partition_command(&input, size, metadata.as_deref())
        }
        Commands::Run { batches, report } => {
            run_command(&manager, &batches, report.as_deref()).await
        }
    }
}

fn partition_command(input: &str, batch_size: usize, metadata: Option<&Path>) -> anyhow::Result<()> {
    let raw = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read work list from stdin")?;
        buffer
    } else {
        fs::read_to_string(input).with_context(|| format!("Failed to read work list {input}"))?
    };

    let metadata: JobMetadata = match metadata {
        Some(path) => serde_json::from_str(
            &fs::read_to_string(path)
                .with_context(|| format!("Failed to read metadata {}", path.display()))?,
        )
        .context("Invalid metadata JSON")?,
        None => JobMetadata::default(),
    };

    let items = parse_work_items(&raw)?;
    let batches = partition(&items, batch_size, &metadata)?;

    info!(
        repositories = items.len(),
        batches = batches.len(),
        batch_size = batch_size,
        "Created batches"
    );

    println!("{}", serde_json::to_string_pretty(&batches)?);
    Ok(())
}

async fn run_command(
    manager: &ConfigManager,
    batches_path: &Path,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = manager.config();
    config.validate_for_run()?;

    let batches: Vec<Batch> = serde_json::from_str(
        &fs::read_to_string(batches_path)
            .with_context(|| format!("Failed to read batches {}", batches_path.display()))?,
    )
    .context("Invalid batches JSON")?;

    let Some(first) = batches.first() else {
        bail!("No batches to process in {}", batches_path.display());
    };

    // Credentials must resolve before the first dispatch
    let dispatch_token = config.resolve_target_token(&first.metadata.target_instance)?;
    let host_token = config.resolve_host_token()?;

    let client = Arc::new(GitHubClient::new(
        GitHubClientConfig::from(config),
        host_token,
        dispatch_token,
    )?);
    let controller = BatchController::new(config, client.clone(), client.clone(), client);

    let report = controller.run(&batches).await.map_err(|e| {
        log_error(
            "controller",
            "run",
            &e.to_string(),
            Some(&format!("{} batches", batches.len())),
        );
        e
    })?;

    if let Some(stop) = &report.stop {
        warn!(
            stopped_at_batch = stop.stopped_at_batch,
            completed_batches = stop.completed_batches,
            remaining_batches = stop.remaining_batches,
            "Orchestration cancelled"
        );
    } else {
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            unknown = report.unknown(),
            "Orchestration finished"
        );
    }

    let rendered = serde_json::to_string_pretty(&report)?;
    match report_path {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(())
}
