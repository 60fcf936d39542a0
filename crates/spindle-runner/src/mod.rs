pub mod config;
mod host_runner;
pub mod logging;

pub use config::{
    ConfigLoadError, FireConfig, LoggingConfig, SchedulerConfig, ScriptingConfig, SpindleConfig,
};
pub use host_runner::{BuildError, HostRunner, HostRunnerBuilder, RunSummary, StopReason};
pub use logging::init_logging;
