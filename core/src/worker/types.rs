use std::collections::HashMap;

/// Invocation parameters for one worker, assembled by the orchestrator and
/// interpreted by the spawning plugin.
#[derive(Debug, Clone)]
pub struct WorkerStartArgs {
    pub task_id: String,
    /// Agent role the worker runs as.
    pub mode: String,
    /// Per-task turn budget.
    pub max_turns: u32,
    /// Tool names granted to the worker; empty means the plugin's default set.
    pub tools: Vec<String>,
    pub envs: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum Signal {
    /// Graceful stop request.
    Term,
    /// Hard kill.
    Kill,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkerOutcome {
    pub exit_code: i32,
    pub duration_ms: Option<u64>,
}

impl WorkerOutcome {
    pub fn is_clean(&self) -> bool {
        self.exit_code == 0
    }
}
