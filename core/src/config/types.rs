use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hard limits enforced by the safety gate. All of them fail closed: a
/// request that cannot be proven within budget is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Maximum number of tasks (live or finished) in one session.
    #[serde(default = "default_max_total_tasks")]
    pub max_total_tasks: usize,

    /// Maximum delegation depth; a parent at this depth cannot delegate.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum direct children per task.
    #[serde(default = "default_max_children")]
    pub max_children: usize,

    /// Maximum number of entries on the active task stack.
    #[serde(default = "default_max_stack_depth")]
    pub max_stack_depth: usize,

    /// Session wall-clock budget in seconds.
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,
}

fn default_max_total_tasks() -> usize {
    20
}

fn default_max_depth() -> usize {
    5
}

fn default_max_children() -> usize {
    5
}

fn default_max_stack_depth() -> usize {
    32
}

fn default_max_session_secs() -> u64 {
    3600
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_total_tasks: default_max_total_tasks(),
            max_depth: default_max_depth(),
            max_children: default_max_children(),
            max_stack_depth: default_max_stack_depth(),
            max_session_secs: default_max_session_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Capacity of the line tap channel between the io pump and the driver.
    #[serde(default = "default_line_tap_channel_capacity")]
    pub line_tap_channel_capacity: usize,

    /// Capacity of the stdin writer channel.
    #[serde(default = "default_input_channel_capacity")]
    pub input_channel_capacity: usize,

    /// Grace interval between the graceful stop signal and the hard kill.
    #[serde(default = "default_abort_grace_ms")]
    pub abort_grace_ms: u64,

    /// Turn budget handed to a worker when the directive omits maxTurns.
    #[serde(default = "default_max_turns")]
    pub default_max_turns: u32,
}

fn default_line_tap_channel_capacity() -> usize {
    1024
}

fn default_input_channel_capacity() -> usize {
    64
}

fn default_abort_grace_ms() -> u64 {
    500
}

fn default_max_turns() -> u32 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            line_tap_channel_capacity: default_line_tap_channel_capacity(),
            input_channel_capacity: default_input_channel_capacity(),
            abort_grace_ms: default_abort_grace_ms(),
            default_max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Optional path of the append-only JSONL progress ledger. Unset keeps
    /// the ledger in memory only.
    #[serde(default)]
    pub ledger_path: Option<String>,

    /// Capacity of the ledger writer channel; records are dropped (and
    /// counted) when it is full rather than blocking the orchestrator.
    #[serde(default = "default_ledger_channel_capacity")]
    pub ledger_channel_capacity: usize,

    /// Age in seconds after which a progress record counts as stale.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_ledger_channel_capacity() -> usize {
    256
}

fn default_stale_after_secs() -> u64 {
    1800
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            ledger_path: None,
            ledger_channel_capacity: default_ledger_channel_capacity(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// EnvFilter string, e.g. "info" or "boomerang_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            level: default_logging_level(),
        }
    }
}
