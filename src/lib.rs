// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod report;
pub mod reporter;
pub mod collector;
pub mod segment;
pub mod runner;

// Re-export commonly used items
pub use types::*;
pub use error::{ConfigError, DecodeError, EventError, FetchError, RunError, SinkError};
pub use config::{
    load_config, load_config_with_env, EnvironmentProvider, MockEnvironment, SystemEnvironment,
};
pub use report::{HealthReport, PackageReport, ResourceReport, Report};
pub use reporter::{
    make_reporters, HealthReporter, PackageReporter, ReportSource, Reporter, ResourceReporter,
};
pub use collector::Collector;
pub use segment::{AnalyticsSink, SegmentSink};
pub use runner::{execute_run, run_reporters, RunOutcome};
