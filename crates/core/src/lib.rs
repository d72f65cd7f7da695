pub mod config;

pub use config::{
    AwsConfig, BatchConfig, Config, EnvironmentSetting, JobManagerConfig, QueueConfig,
    ResourceFile, TaskTemplateConfig,
};
