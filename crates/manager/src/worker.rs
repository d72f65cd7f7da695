//! Control loop driven by instantaneous pool load.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use jobman_core::JobManagerConfig;
use jobman_queue::MessageQueue;

use crate::admission::{admit, pull_messages, LoopOutcome};
use crate::batch::Batch;
use crate::error::LoopError;
use crate::load_generator::PoolLoadGenerator;

/// Keeps the pool topped up from the queue using [`PoolLoadGenerator`].
///
/// Each cycle polls pool load, asks the controller how many tasks to add,
/// admits that many messages and sleeps. The process's own task counts as
/// one unit of pool load, so a load of one or less means the pool is idle.
pub struct Worker {
    batch: Batch,
    queue: Arc<dyn MessageQueue>,
    config: JobManagerConfig,
    job_id: String,
    generator: PoolLoadGenerator,
    run_once: bool,
}

impl Worker {
    pub fn new(
        batch: Batch,
        queue: Arc<dyn MessageQueue>,
        config: JobManagerConfig,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            batch,
            queue,
            config,
            job_id: job_id.into(),
            generator: PoolLoadGenerator::new(),
            run_once: false,
        }
    }

    /// Stop after the first complete cycle.
    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn with_generator(mut self, generator: PoolLoadGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn generator(&self) -> &PoolLoadGenerator {
        &self.generator
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub async fn run(&mut self) -> Result<LoopOutcome, LoopError> {
        let job_id = self
            .batch
            .create_job_if_not_exists(&self.job_id, true)
            .await?;
        let hours = self.config.max_wall_clock_time_in_hours.max(0.0);
        let budget = Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(Duration::MAX);
        let restart_after = Instant::now().checked_add(budget);
        let interval = Duration::from_secs(self.config.add_tasks_interval_in_seconds);

        info!(
            job_id = %job_id,
            max_wall_clock_time_in_hours = self.config.max_wall_clock_time_in_hours,
            interval_secs = interval.as_secs(),
            "worker started"
        );

        loop {
            let pool = self.batch.pool_metrics().await?;
            let requested = self
                .generator
                .tasks_increment_count(&pool, self.config.active_to_running_tasks_ratio);

            let mut admitted = 0;
            if requested > 0 {
                let messages = pull_messages(self.queue.as_ref(), requested as usize).await?;
                if messages.is_empty() && pool.load.total() <= 1 {
                    info!(job_id = %job_id, "queue empty and pool idle, stopping");
                    return Ok(LoopOutcome::QueueDrained);
                }
                admitted = admit(&mut self.batch, self.queue.as_ref(), &job_id, &messages).await?;
                self.generator.set_last_tasks_increment_count(admitted as i64);
            }

            info!(
                job_id = %job_id,
                active_tasks = pool.load.active_tasks,
                running_tasks = pool.load.running_tasks,
                requested,
                admitted,
                sampling_interval_secs = self.generator.sampling_interval_in_seconds(),
                processing_speed_per_minute = self.generator.processing_speed_per_minute(),
                ratio = self.generator.active_to_running_tasks_ratio(),
                "worker cycle"
            );

            if self.run_once {
                return Ok(LoopOutcome::SinglePass);
            }

            if restart_after.is_some_and(|at| Instant::now() >= at) {
                info!(job_id = %job_id, "wall clock budget spent, draining pool");
                self.drain(interval).await?;
                return Ok(LoopOutcome::Restart);
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Wait until nothing but this process is left running in the pool.
    async fn drain(&self, interval: Duration) -> Result<(), LoopError> {
        loop {
            let pool = self.batch.pool_metrics().await?;
            if pool.load.total() <= 1 {
                info!("pool drained");
                return Ok(());
            }
            info!(
                active_tasks = pool.load.active_tasks,
                running_tasks = pool.load.running_tasks,
                "draining"
            );
            tokio::time::sleep(interval).await;
        }
    }
}
