//! Rolling pending/running task series.
//!
//! The pool reports only instantaneous load, so throughput history is built
//! client-side: a background task samples [`PoolService::pool_metrics`] at
//! [`SAMPLES_PER_MINUTE`] and keeps one reporting interval worth of samples.
//! Active tasks count as pending.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::service::PoolService;
use crate::types::{BatchMetricsResult, PoolLoad};

pub const SAMPLES_PER_MINUTE: u32 = 2;

/// Delay between two samples.
pub fn sample_interval() -> Duration {
    Duration::from_secs(60 / SAMPLES_PER_MINUTE as u64)
}

pub type SharedWindow = Arc<Mutex<MetricsWindow>>;

#[derive(Debug, Clone)]
pub struct MetricsWindow {
    interval_in_minutes: u32,
    capacity: usize,
    pending: VecDeque<f64>,
    running: VecDeque<f64>,
}

impl MetricsWindow {
    pub fn new(interval_in_minutes: u32) -> Self {
        let capacity = (interval_in_minutes.max(1) * SAMPLES_PER_MINUTE) as usize;
        Self {
            interval_in_minutes: interval_in_minutes.max(1),
            capacity,
            pending: VecDeque::with_capacity(capacity),
            running: VecDeque::with_capacity(capacity),
        }
    }

    pub fn shared(interval_in_minutes: u32) -> SharedWindow {
        Arc::new(Mutex::new(Self::new(interval_in_minutes)))
    }

    /// Append one sample, evicting the oldest once the window is full.
    pub fn record(&mut self, load: &PoolLoad) {
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
            self.running.pop_front();
        }
        self.pending.push_back(load.active_tasks as f64);
        self.running.push_back(load.running_tasks as f64);
    }

    pub fn snapshot(&self, pool_id: &str) -> BatchMetricsResult {
        BatchMetricsResult {
            pool_id: pool_id.to_string(),
            time_interval_in_minutes: self.interval_in_minutes as f64,
            pending_tasks_vector: self.pending.iter().copied().collect(),
            running_tasks_vector: self.running.iter().copied().collect(),
        }
    }
}

/// Sample `service` into `window` every `every` until the handle is aborted.
///
/// A failed sample is logged and skipped; gaps only lower the sample
/// coverage the throughput ratio is checked against.
pub fn spawn_sampler(
    service: Arc<dyn PoolService>,
    window: SharedWindow,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match service.pool_metrics().await {
                Ok(info) => {
                    debug!(
                        active = info.load.active_tasks,
                        running = info.load.running_tasks,
                        "pool load sampled"
                    );
                    window.lock().await.record(&info.load);
                }
                Err(e) => warn!(error = %e, "pool load sample failed"),
            }
        }
    })
}
