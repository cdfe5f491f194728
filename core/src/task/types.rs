use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One delegated task. Owned by the orchestrator's task store; collaborators
/// see clones or field patches, never the record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Agent role the worker is invoked with ("coder", "tester", ...).
    pub mode: String,
    pub instruction: String,
    pub status: TaskStatus,
    /// 0 for a root task, parent depth + 1 otherwise.
    pub depth: usize,
    pub parent_id: Option<String>,
    /// Id of the ancestor with no parent; stable across the whole subtree.
    pub root_id: String,
    /// Ordered child ids, in delegation order.
    pub children: Vec<String>,
    pub result: Option<String>,
    /// True only while this task waits on an unfinished child.
    pub is_paused: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh root task: depth 0, root id pointing at itself.
    pub fn new_root(id: String, mode: String, instruction: String) -> Self {
        let now = Utc::now();
        Self {
            root_id: id.clone(),
            id,
            mode,
            instruction,
            status: TaskStatus::Pending,
            depth: 0,
            parent_id: None,
            children: Vec::new(),
            result: None,
            is_paused: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A child task one level below `parent`.
    pub fn new_child(id: String, mode: String, instruction: String, parent: &Task) -> Self {
        let now = Utc::now();
        Self {
            id,
            mode,
            instruction,
            status: TaskStatus::Pending,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
            root_id: parent.root_id.clone(),
            children: Vec::new(),
            result: None,
            is_paused: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied through `TaskStack::update_task`. Unset fields are
/// left untouched; `updated_at` is stamped on every apply.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<String>,
    pub is_paused: Option<bool>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Delegation request extracted from a `new_task` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub mode: String,
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

/// Completion report extracted from an `attempt_completion` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub result: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Lifecycle events broadcast by the task stack.
#[derive(Debug, Clone, Serialize)]
pub enum TaskEvent {
    TaskCreated {
        task_id: String,
        mode: String,
        timestamp: DateTime<Utc>,
    },
    TaskPaused {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskResumed {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskPaused { task_id, .. }
            | Self::TaskResumed { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => task_id,
        }
    }
}

/// One node of the exported hierarchy view, rebuilt from `parent_id` /
/// `children` links, intentionally independent of stack order.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub id: String,
    pub mode: String,
    pub status: TaskStatus,
    pub depth: usize,
    pub children: Vec<TaskNode>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}
