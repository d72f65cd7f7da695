//! job-manager: admits queued work into a remote compute pool.
//!
//! Two control loops are available:
//! - `worker` sizes admissions from instantaneous pool load
//! - `runner` sizes admissions from sampled pool throughput

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use jobman_core::config::{load_dotenv, Config};
use jobman_manager::{Batch, Runner, Worker};
use jobman_pool::{PoolService, RestPoolClient};
use jobman_queue::{MessageQueue, SqsQueue};

// ── CLI ─────────────────────────────────────────────────────────────

/// Adaptive job manager for a remote compute pool.
#[derive(Parser, Debug)]
#[command(name = "job-manager", version, about)]
struct Cli {
    /// Configuration profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "JOBMAN_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Control loop driven by pool load.
    Worker {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Control loop driven by sampled throughput.
    Runner {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let client = Arc::new(
        RestPoolClient::new(&config.batch).context("failed to create pool service client")?,
    );
    let queue: Arc<dyn MessageQueue> = Arc::new(
        SqsQueue::new(&config.aws, &config.queue)
            .await
            .context("failed to create queue client")?,
    );
    let service: Arc<dyn PoolService> = client.clone();
    let batch = Batch::new(service, config.batch.pool_id.clone(), config.task.clone())
        .with_self_task_id(config.batch.task_id.clone());

    let outcome = match cli.mode {
        Mode::Worker { once } => {
            Worker::new(batch, queue, config.job_manager.clone(), &config.batch.job_id)
                .run_once(once)
                .run()
                .await
                .context("worker loop failed")?
        }
        Mode::Runner { once } => {
            let sampler = client.start_sampler();
            let result = Runner::new(batch, queue, config.job_manager.clone(), &config.batch.job_id)
                .run_once(once)
                .run()
                .await;
            sampler.abort();
            result.context("runner loop failed")?
        }
    };

    info!(%outcome, "job manager stopped");
    Ok(())
}
