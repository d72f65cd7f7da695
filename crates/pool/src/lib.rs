//! Client side of the remote compute pool job scheduler.
//!
//! This crate provides:
//! - `PoolService` trait covering jobs, batched task submission, task
//!   listing and pool load/throughput metrics
//! - `RestPoolClient`, a reqwest implementation for a Batch-style REST API
//! - `MetricsWindow`, the sampled pending/running series behind
//!   `PoolService::batch_metrics`

pub mod error;
pub mod rest;
pub mod sampler;
pub mod service;
pub mod types;

pub use error::PoolError;
pub use rest::RestPoolClient;
pub use sampler::MetricsWindow;
pub use service::PoolService;
pub use types::*;
