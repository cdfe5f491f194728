use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::SafetyConfig;
use crate::task::types::Task;

use super::patterns::{DENIED_COMMANDS, PROTECTED_DIRS, PROTECTED_FILES};

/// A limit the safety gate refused to cross. Creation violations surface
/// synchronously to the caller and abort the operation with no side effects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("task limit reached ({limit} tasks per session)")]
    TaskLimitExceeded { limit: usize },
    #[error("session time budget exhausted ({limit_secs}s)")]
    SessionExpired { limit_secs: u64 },
    #[error("delegation depth limit reached ({limit})")]
    DepthExceeded { limit: usize },
    #[error("child limit reached ({limit} children per task)")]
    ChildLimitExceeded { limit: usize },
    #[error("suspected delegation loop: {count} '{mode}' siblings already exist")]
    ModeLoopSuspected { mode: String, count: usize },
    #[error("task stack depth limit reached ({limit})")]
    StackDepthExceeded { limit: usize },
    #[error("command matches deny-list ({reason}): {command}")]
    DangerousCommand { command: String, reason: String },
    #[error("path is protected against {operation}: {path}")]
    ProtectedPath { path: String, operation: String },
}

/// File operation classes checked by the gate. Reads are unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Delete,
}

impl FileOperation {
    fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

/// Remaining session budget, derived from configured limits minus live
/// counters handed in by the caller.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub tasks_used: usize,
    pub tasks_remaining: usize,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Fail-closed validation gate. Stateless apart from the session start
/// instant; every check runs against inputs the caller passes in and never
/// mutates shared state.
pub struct SafetyManager {
    config: SafetyConfig,
    session_started: Instant,
}

impl SafetyManager {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            session_started: Instant::now(),
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Validates one task creation against the session budget and, when a
    /// parent is given, against the per-parent fan-out limits.
    ///
    /// The identical-mode sibling check is a best-effort heuristic against
    /// runaway delegation loops, not a general cycle guarantee.
    pub fn validate_task_creation(
        &self,
        parent: Option<&Task>,
        new_mode: &str,
        all_tasks: &HashMap<String, Task>,
    ) -> Result<(), SafetyViolation> {
        if all_tasks.len() + 1 > self.config.max_total_tasks {
            return Err(SafetyViolation::TaskLimitExceeded {
                limit: self.config.max_total_tasks,
            });
        }

        let budget = Duration::from_secs(self.config.max_session_secs);
        if self.session_started.elapsed() > budget {
            return Err(SafetyViolation::SessionExpired {
                limit_secs: self.config.max_session_secs,
            });
        }

        let Some(parent) = parent else {
            return Ok(());
        };

        if parent.depth >= self.config.max_depth {
            return Err(SafetyViolation::DepthExceeded {
                limit: self.config.max_depth,
            });
        }

        if parent.children.len() >= self.config.max_children {
            return Err(SafetyViolation::ChildLimitExceeded {
                limit: self.config.max_children,
            });
        }

        let same_mode_siblings = parent
            .children
            .iter()
            .filter_map(|id| all_tasks.get(id))
            .filter(|sibling| sibling.mode == new_mode)
            .count();
        if same_mode_siblings >= 3 {
            return Err(SafetyViolation::ModeLoopSuspected {
                mode: new_mode.to_string(),
                count: same_mode_siblings,
            });
        }

        Ok(())
    }

    /// Rejects commands matching the fixed destructive-shell deny-list.
    pub fn validate_command_execution(&self, command: &str) -> Result<(), SafetyViolation> {
        for (pattern, reason) in DENIED_COMMANDS.iter() {
            if pattern.is_match(command) {
                return Err(SafetyViolation::DangerousCommand {
                    command: command.to_string(),
                    reason: (*reason).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Guards writes and deletes against credential files and protected
    /// system directories. Reads are unrestricted.
    pub fn validate_file_operation(
        &self,
        path: &str,
        operation: FileOperation,
    ) -> Result<(), SafetyViolation> {
        if operation == FileOperation::Read {
            return Ok(());
        }

        let protected = PROTECTED_DIRS.iter().any(|dir| path.starts_with(dir))
            || PROTECTED_FILES.iter().any(|p| p.is_match(path));
        if protected {
            return Err(SafetyViolation::ProtectedPath {
                path: path.to_string(),
                operation: operation.label().to_string(),
            });
        }
        Ok(())
    }

    pub fn session_stats(&self, total_tasks: usize) -> SessionStats {
        let elapsed = self.session_started.elapsed();
        let budget = Duration::from_secs(self.config.max_session_secs);
        SessionStats {
            tasks_used: total_tasks,
            tasks_remaining: self.config.max_total_tasks.saturating_sub(total_tasks),
            elapsed,
            remaining: budget.saturating_sub(elapsed),
        }
    }
}
