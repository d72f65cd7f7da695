//! Task-processing ratio from sampled pending/running series.

use jobman_pool::sampler::SAMPLES_PER_MINUTE;
use jobman_pool::BatchMetricsResult;

/// Sentinel for "not enough data".
pub const UNAVAILABLE: f64 = -1.0;

/// Minimum share of expected samples, in percent, before a series is used.
pub const MIN_SAMPLE_PERCENT: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct BatchMetrics {
    result: BatchMetricsResult,
    ratio: f64,
}

impl BatchMetrics {
    pub fn new(result: BatchMetricsResult) -> Self {
        let ratio = processing_ratio(&result);
        Self { result, ratio }
    }

    /// `mean(running) / mean(pending)`, or [`UNAVAILABLE`].
    pub fn task_processing_ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_available(&self) -> bool {
        self.ratio != UNAVAILABLE
    }

    /// Pending-task average at which the observed running average would
    /// yield `target`.
    pub fn pending_tasks_for_processing_ratio(&self, target: f64) -> f64 {
        if !self.is_available() || target <= 0.0 {
            return UNAVAILABLE;
        }
        mean(&self.result.running_tasks_vector) / target
    }

    /// Whole tasks to add so the pending average reaches
    /// [`Self::pending_tasks_for_processing_ratio`]. Never negative unless
    /// unavailable.
    pub fn pending_task_increment_count(&self, target: f64) -> i64 {
        let wanted = self.pending_tasks_for_processing_ratio(target);
        if wanted == UNAVAILABLE {
            return UNAVAILABLE as i64;
        }
        let missing = (wanted - mean(&self.result.pending_tasks_vector)).floor();
        (missing as i64).max(0)
    }

    pub fn result(&self) -> &BatchMetricsResult {
        &self.result
    }
}

fn processing_ratio(result: &BatchMetricsResult) -> f64 {
    let expected = result.time_interval_in_minutes * SAMPLES_PER_MINUTE as f64;
    if sample_percent(&result.pending_tasks_vector, expected) < MIN_SAMPLE_PERCENT
        || sample_percent(&result.running_tasks_vector, expected) < MIN_SAMPLE_PERCENT
    {
        return UNAVAILABLE;
    }

    let pending = mean(&result.pending_tasks_vector);
    if pending == 0.0 {
        return UNAVAILABLE;
    }
    mean(&result.running_tasks_vector) / pending
}

fn sample_percent(samples: &[f64], expected: f64) -> f64 {
    if expected <= 0.0 {
        return 0.0;
    }
    samples.len() as f64 * 100.0 / expected
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
