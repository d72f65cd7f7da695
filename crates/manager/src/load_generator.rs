//! Adaptive controller deciding how many tasks to add each cycle.
//!
//! The first observation seeds the pool up to `maxTasksPerPool * ratio`.
//! Later observations estimate how many tasks the pool consumed since the
//! previous cycle and top the pool back up, adding half of that speed as
//! headroom. When the pool runs dry while tasks were being added, the
//! active-to-running ratio is raised by one. It is never lowered.

use chrono::{DateTime, Utc};
use tracing::debug;

use jobman_pool::{PoolLoad, PoolMetricsInfo};

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What the controller remembers from its previous cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMetricsState {
    pub pool_load: PoolLoad,
    pub tasks_increment_count: i64,
    /// Tasks consumed by the pool between the last two observations.
    pub processing_speed: i64,
    pub active_to_running_tasks_ratio: f64,
    pub sampling_interval_in_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct PoolLoadGenerator {
    state: Option<PoolMetricsState>,
    clock: Clock,
}

impl Default for PoolLoadGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolLoadGenerator {
    pub fn new() -> Self {
        Self::with_clock(Box::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { state: None, clock }
    }

    /// Tasks to add given the current pool observation.
    ///
    /// `target_ratio` only seeds the first cycle; afterwards the stored
    /// ratio is used. The cold-start value is returned as computed and may
    /// be negative when the pool is already over target.
    pub fn tasks_increment_count(&mut self, info: &PoolMetricsInfo, target_ratio: f64) -> i64 {
        let now = (self.clock)();
        let active = info.load.active_tasks;

        let Some(last) = self.state.as_ref() else {
            let increment = target_tasks(info.max_tasks_per_pool, target_ratio) - active;
            self.state = Some(PoolMetricsState {
                pool_load: info.load,
                tasks_increment_count: increment.max(0),
                processing_speed: 0,
                active_to_running_tasks_ratio: target_ratio,
                sampling_interval_in_seconds: 1.0,
                timestamp: now,
            });
            debug!(increment, active, "controller cold start");
            return increment;
        };

        let processing_speed = last.tasks_increment_count + last.pool_load.active_tasks - active;

        let mut ratio = last.active_to_running_tasks_ratio;
        if active == 0 && last.tasks_increment_count > 0 {
            ratio += 1.0;
            debug!(ratio, "pool ran dry, raising active-to-running ratio");
        }

        let headroom = (processing_speed as f64 / 2.0).ceil() as i64;
        let increment = (target_tasks(info.max_tasks_per_pool, ratio) - active + headroom).max(0);
        let sampling_interval_in_seconds =
            (now - last.timestamp).num_milliseconds() as f64 / 1000.0;

        self.state = Some(PoolMetricsState {
            pool_load: info.load,
            tasks_increment_count: increment,
            processing_speed,
            active_to_running_tasks_ratio: ratio,
            sampling_interval_in_seconds,
            timestamp: now,
        });
        increment
    }

    /// Replace the stored increment with the number of tasks actually
    /// admitted, so the next speed estimate is based on reality.
    pub fn set_last_tasks_increment_count(&mut self, admitted: i64) {
        if let Some(state) = self.state.as_mut() {
            state.tasks_increment_count = admitted;
        }
    }

    pub fn processing_speed_per_minute(&self) -> i64 {
        match &self.state {
            Some(s) if s.sampling_interval_in_seconds > 0.0 => {
                (60.0 / s.sampling_interval_in_seconds * s.processing_speed as f64).round() as i64
            }
            _ => 0,
        }
    }

    pub fn sampling_interval_in_seconds(&self) -> f64 {
        self.state
            .as_ref()
            .map_or(0.0, |s| s.sampling_interval_in_seconds)
    }

    pub fn active_to_running_tasks_ratio(&self) -> f64 {
        self.state
            .as_ref()
            .map_or(0.0, |s| s.active_to_running_tasks_ratio)
    }

    pub fn state(&self) -> Option<&PoolMetricsState> {
        self.state.as_ref()
    }
}

fn target_tasks(max_tasks_per_pool: i64, ratio: f64) -> i64 {
    (max_tasks_per_pool as f64 * ratio).ceil() as i64
}
