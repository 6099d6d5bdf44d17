mod classify;
mod cleanup;
mod cli;
mod config;
mod daemon;
mod db;
mod error;
mod media;
mod models;
mod normalize;
mod paginate;
mod publish;
mod queue;
mod server;
mod sources;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::{load_config, validate_config};
use crate::models::{CollectorJobData, SourceType};
use crate::queue::{JobOptions, Queue};

/// Job name of collector jobs enqueued from the command line.
const COLLECT_JOB_NAME: &str = "collect";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.collector.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config_path = %cli.config.display(), "config loaded");

    validate_config(&config).context("config validation failed")?;
    info!("config validated successfully");

    match cli.command {
        Some(Commands::Validate) => {
            println!("Configuration is valid.");
        }
        Some(Commands::Enqueue { file }) => {
            let content =
                std::fs::read_to_string(&file).with_context(|| format!("reading job file {}", file.display()))?;
            let payload: serde_json::Value =
                serde_json::from_str(&content).with_context(|| format!("parsing job file {}", file.display()))?;
            let job = CollectorJobData::parse(&payload).context("job file is not a collector job")?;

            let source_type: SourceType = job.source_type.parse().map_err(anyhow::Error::msg)?;

            let pool = db::create_pool(&config).await.context("creating database")?;
            let queue_name = config.queues.fetcher(source_type);
            let options = JobOptions {
                priority: job.priority,
                ..publish::delivery_options(&config.delivery)?
            };
            let job_id = Queue::new(pool.clone())
                .enqueue(queue_name, COLLECT_JOB_NAME, &payload, &options)
                .await
                .context("enqueueing job")?;
            pool.close().await;

            println!("Enqueued job {job_id} on '{queue_name}'.");
        }
        Some(Commands::Stats) => {
            let pool = db::create_pool(&config).await.context("creating database")?;
            let counts = Queue::new(pool.clone()).counts().await.context("reading queue counts")?;
            pool.close().await;

            if counts.is_empty() {
                println!("No jobs.");
            }
            for (queue, c) in counts {
                println!(
                    "{queue}: waiting={} active={} completed={} failed={}",
                    c.waiting, c.active, c.completed, c.failed
                );
            }
        }
        None => {
            daemon::run(config).await?;
        }
    }

    Ok(())
}
