//! Adaptive admission of queued work into a remote compute pool.
//!
//! This crate provides:
//! - `JobTask`, the per-message unit of work and its lifecycle
//! - `Batch`, job creation and task submission over a `PoolService`
//! - `PoolLoadGenerator` and `BatchMetrics`, the two admission controllers
//! - `Worker` and `Runner`, the control loops tying queue, pool and
//!   controller together

pub mod admission;
pub mod batch;
pub mod batch_metrics;
pub mod command_line;
pub mod error;
pub mod job_task;
pub mod load_generator;
pub mod runner;
pub mod worker;

pub use admission::LoopOutcome;
pub use batch::Batch;
pub use batch_metrics::BatchMetrics;
pub use error::{BatchError, LoopError};
pub use job_task::{JobTask, JobTaskState};
pub use load_generator::{PoolLoadGenerator, PoolMetricsState};
pub use runner::Runner;
pub use worker::Worker;
