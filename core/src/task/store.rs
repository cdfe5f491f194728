use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{Task, TaskStatus};

/// Shared handle to the task map. The orchestrator owns the store and hands
/// clones of this handle to collaborators (stack, safety gate) instead of
/// exposing a global registry.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        let mut tasks = self.inner.write().await;
        tasks.insert(task.id.clone(), task);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        let tasks = self.inner.read().await;
        tasks.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        let tasks = self.inner.read().await;
        tasks.contains_key(id)
    }

    /// Applies `f` to the task and stamps `updated_at`. Returns false if the
    /// task is absent.
    pub async fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.inner.write().await;
        match tasks.get_mut(id) {
            Some(task) => {
                f(task);
                task.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Task> {
        let mut tasks = self.inner.write().await;
        tasks.remove(id)
    }

    pub async fn len(&self) -> usize {
        let tasks = self.inner.read().await;
        tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<Task> {
        let tasks = self.inner.read().await;
        tasks.values().cloned().collect()
    }

    /// Snapshot of the whole map, used by the safety gate so its checks run
    /// against one consistent view.
    pub async fn snapshot(&self) -> HashMap<String, Task> {
        let tasks = self.inner.read().await;
        tasks.clone()
    }

    /// True while any task is still pending, running, or paused.
    pub async fn has_live_tasks(&self) -> bool {
        let tasks = self.inner.read().await;
        tasks.values().any(|t| !t.status.is_terminal())
    }

    /// Tasks without a parent, i.e. the roots of the hierarchy export.
    pub async fn roots(&self) -> Vec<Task> {
        let tasks = self.inner.read().await;
        let mut roots: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_id.is_none())
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        roots
    }

    pub async fn count_by_status(&self, status: TaskStatus) -> usize {
        let tasks = self.inner.read().await;
        tasks.values().filter(|t| t.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_stamps_updated_at() {
        let store = TaskStore::new();
        let task = Task::new_root("t1".into(), "coder".into(), "do".into());
        let before = task.updated_at;
        store.insert(task).await;

        assert!(
            store
                .update("t1", |t| t.status = TaskStatus::Running)
                .await
        );
        let task = store.get("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.updated_at >= before);
    }

    #[tokio::test]
    async fn update_missing_task_returns_false() {
        let store = TaskStore::new();
        assert!(!store.update("nope", |_| {}).await);
    }

    #[tokio::test]
    async fn roots_are_sorted_by_creation() {
        let store = TaskStore::new();
        let root = Task::new_root("r1".into(), "coder".into(), "x".into());
        let child = Task::new_child("c1".into(), "tester".into(), "y".into(), &root);
        store.insert(root).await;
        store.insert(child).await;

        let roots = store.roots().await;
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "r1");
    }
}
