//! Stable re-exports for consumers (`plugins` and external crates).
//!
//! Prefer importing from `boomerang_core::api` instead of reaching into
//! internal modules.

pub use crate::config::{
    LoggingConfig, OrchestratorConfig, ProgressConfig, SafetyConfig, WorkerConfig,
};
pub use crate::directive::{
    DirectiveParser, OrchestrationController, OrchestrationHandler, RegexDirectiveParser,
    ToolCall, DEFAULT_MAX_TURNS,
};
pub use crate::error::{OrchestratorError, WorkerError};
pub use crate::logging::init_logging;
pub use crate::orchestrator::{RootTaskOptions, TaskOrchestrator};
pub use crate::progress::{
    ProgressEntry, ProgressStatus, ProgressTracker, ProgressUpdate,
};
pub use crate::safety::{FileOperation, SafetyManager, SafetyViolation, SessionStats};
pub use crate::task::types::{
    CompletionRequest, DelegationRequest, Task, TaskEvent, TaskNode, TaskStatus, TaskUpdate,
};
pub use crate::task::{TaskStack, TaskStackEntry, TaskStore};
pub use crate::worker::{
    Signal, WorkerOutcome, WorkerPlugin, WorkerSession, WorkerStartArgs,
};
