mod types;

pub use types::{LoggingConfig, OrchestratorConfig, ProgressConfig, SafetyConfig, WorkerConfig};
