//! Control loop driven by sampled throughput.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use jobman_core::JobManagerConfig;
use jobman_queue::MessageQueue;

use crate::admission::{admit, pull_messages, LoopOutcome};
use crate::batch::Batch;
use crate::batch_metrics::{BatchMetrics, UNAVAILABLE};
use crate::error::LoopError;

/// Admits work while the pool keeps up with what it already has.
///
/// The processing ratio comes from [`BatchMetrics`]. Admission is skipped
/// while the ratio is known and below `minTaskProcessingRatio`; an unknown
/// ratio falls back to the configured `taskIncrementCount`. The loop ends
/// as soon as the queue comes back empty.
pub struct Runner {
    batch: Batch,
    queue: Arc<dyn MessageQueue>,
    config: JobManagerConfig,
    job_id: String,
    run_once: bool,
}

impl Runner {
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
            run_once: false,
        }
    }

    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub async fn run(&mut self) -> Result<LoopOutcome, LoopError> {
        let job_id = self
            .batch
            .create_job_if_not_exists(&self.job_id, false)
            .await?;
        let interval = Duration::from_secs(self.config.task_increment_interval_in_seconds);
        info!(job_id = %job_id, interval_secs = interval.as_secs(), "runner started");

        loop {
            let metrics = BatchMetrics::new(self.batch.batch_metrics().await?);
            let ratio = metrics.task_processing_ratio();
            let requested = if metrics.is_available() {
                metrics.pending_task_increment_count(self.config.max_task_processing_ratio)
            } else {
                i64::from(self.config.task_increment_count)
            };

            let admitting = ratio >= self.config.min_task_processing_ratio || ratio == UNAVAILABLE;
            let mut admitted = 0;
            if admitting && requested > 0 {
                let messages = pull_messages(self.queue.as_ref(), requested as usize).await?;
                if messages.is_empty() {
                    info!(job_id = %job_id, "queue empty, stopping");
                    return Ok(LoopOutcome::QueueDrained);
                }
                admitted = admit(&mut self.batch, self.queue.as_ref(), &job_id, &messages).await?;
            }

            info!(
                job_id = %job_id,
                ratio,
                samples = metrics.result().pending_tasks_vector.len(),
                admitting,
                requested,
                admitted,
                "runner cycle"
            );

            if self.run_once {
                return Ok(LoopOutcome::SinglePass);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
