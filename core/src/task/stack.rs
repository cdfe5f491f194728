use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::safety::SafetyViolation;

use super::store::TaskStore;
use super::types::{Task, TaskEvent, TaskStatus, TaskUpdate};

/// One stack entry. The task record itself lives in the store; the entry only
/// remembers which task sits at this position and when it was pushed.
#[derive(Debug, Clone)]
pub struct TaskStackEntry {
    pub task_id: String,
    pub pushed_at: DateTime<Utc>,
}

/// LIFO view of the active tasks plus lifecycle-event bookkeeping.
///
/// Stack order reflects push order, which is creation order, not the
/// `parent_id` tree. After out-of-order removals the two can diverge;
/// hierarchy logic must use `parent_id`, never stack adjacency.
pub struct TaskStack {
    store: TaskStore,
    entries: tokio::sync::Mutex<Vec<TaskStackEntry>>,
    max_stack_depth: usize,
    event_tx: broadcast::Sender<TaskEvent>,
}

impl TaskStack {
    pub fn new(store: TaskStore, max_stack_depth: usize) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            store,
            entries: tokio::sync::Mutex::new(Vec::new()),
            max_stack_depth,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: TaskEvent) {
        // Nobody listening is fine; events are observability, not control flow.
        let _ = self.event_tx.send(event);
    }

    /// Pushes a task onto the stack and emits `TaskCreated`.
    pub async fn push(&self, task: &Task) -> Result<(), SafetyViolation> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_stack_depth {
            return Err(SafetyViolation::StackDepthExceeded {
                limit: self.max_stack_depth,
            });
        }
        entries.push(TaskStackEntry {
            task_id: task.id.clone(),
            pushed_at: Utc::now(),
        });
        drop(entries);

        self.emit(TaskEvent::TaskCreated {
            task_id: task.id.clone(),
            mode: task.mode.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Removes and returns the top task. An empty stack yields `None`.
    pub async fn pop(&self) -> Option<Task> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.pop()
        }?;
        self.store.get(&entry.task_id).await
    }

    pub async fn peek(&self) -> Option<Task> {
        let task_id = {
            let entries = self.entries.lock().await;
            entries.last().map(|e| e.task_id.clone())
        }?;
        self.store.get(&task_id).await
    }

    /// The currently active task, i.e. the top of the stack.
    pub async fn current_task(&self) -> Option<Task> {
        self.peek().await
    }

    pub async fn find_task(&self, id: &str) -> Option<Task> {
        let on_stack = {
            let entries = self.entries.lock().await;
            entries.iter().any(|e| e.task_id == id)
        };
        if !on_stack {
            return None;
        }
        self.store.get(id).await
    }

    /// The entry directly below `id` in push order. This is a stack-order
    /// adjacency relation, distinct from the logical `parent_id` field, and
    /// may diverge from it after out-of-order removals.
    pub async fn find_parent_task(&self, id: &str) -> Option<Task> {
        let below = {
            let entries = self.entries.lock().await;
            let idx = entries.iter().position(|e| e.task_id == id)?;
            if idx == 0 {
                return None;
            }
            entries[idx - 1].task_id.clone()
        };
        self.store.get(&below).await
    }

    /// Stack index of `id`, bottom being 0. `None` when not on the stack.
    pub async fn task_depth(&self, id: &str) -> Option<usize> {
        let entries = self.entries.lock().await;
        entries.iter().position(|e| e.task_id == id)
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Applies a partial update to the task record and bumps `updated_at`.
    /// A status change additionally emits the matching lifecycle event.
    /// Returns false when the task is absent from the store.
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> bool {
        let old_status = match self.store.get(id).await {
            Some(task) => task.status,
            None => return false,
        };

        let applied = self
            .store
            .update(id, |task| {
                if let Some(status) = update.status {
                    task.status = status;
                }
                if let Some(result) = update.result {
                    task.result = Some(result);
                }
                if let Some(paused) = update.is_paused {
                    task.is_paused = paused;
                }
            })
            .await;
        if !applied {
            return false;
        }

        if let Some(new_status) = update.status {
            if new_status != old_status {
                if let Some(event) = Self::status_event(id, new_status) {
                    self.emit(event);
                }
            }
        }
        true
    }

    fn status_event(task_id: &str, status: TaskStatus) -> Option<TaskEvent> {
        let task_id = task_id.to_string();
        let timestamp = Utc::now();
        match status {
            TaskStatus::Paused => Some(TaskEvent::TaskPaused { task_id, timestamp }),
            TaskStatus::Running => Some(TaskEvent::TaskResumed { task_id, timestamp }),
            TaskStatus::Completed => Some(TaskEvent::TaskCompleted { task_id, timestamp }),
            TaskStatus::Failed => Some(TaskEvent::TaskFailed { task_id, timestamp }),
            TaskStatus::Pending => None,
        }
    }

    /// Removes the entry at any position; completion is not always LIFO when
    /// siblings run concurrently. Returns false if the id is not on the stack.
    pub async fn remove_task(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.iter().position(|e| e.task_id == id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Empties the stack, emitting a best-effort `TaskCompleted` for every
    /// remaining entry.
    pub async fn clear(&self) {
        let drained: Vec<TaskStackEntry> = {
            let mut entries = self.entries.lock().await;
            entries.drain(..).collect()
        };
        for entry in drained {
            self.emit(TaskEvent::TaskCompleted {
                task_id: entry.task_id,
                timestamp: Utc::now(),
            });
        }
    }
}
