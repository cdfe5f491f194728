use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ledger::LedgerTx;

/// Status of one agent in the progress ledger. `Waiting` is the ledger's view
/// of a paused task (it waits on a child); both `Running` and `Waiting` count
/// as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One record per task id, independent of the in-memory task state so it can
/// outlive the stack and be exported as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Same value as the task id.
    pub agent_id: String,
    pub name: String,
    pub status: ProgressStatus,
    /// 0–100.
    pub progress: u8,
    pub current_task: String,
    pub last_update: DateTime<Utc>,
}

/// Partial upsert; unset fields keep their previous value.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub name: Option<String>,
    pub status: Option<ProgressStatus>,
    pub progress: Option<u8>,
    pub current_task: Option<String>,
}

/// Durable, queryable progress ledger. Writes are last-writer-wins with no
/// optimistic check, which is sound under the single-controller model.
pub struct ProgressTracker {
    entries: RwLock<HashMap<String, ProgressEntry>>,
    ledger: Option<LedgerTx>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ledger: None,
        }
    }

    pub fn with_ledger(ledger: LedgerTx) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ledger: Some(ledger),
        }
    }

    /// Upserts the record for `task_id`, preserving unspecified fields and
    /// stamping `last_update`.
    pub async fn update_progress(&self, task_id: &str, update: ProgressUpdate) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(task_id.to_string())
            .or_insert_with(|| ProgressEntry {
                agent_id: task_id.to_string(),
                name: task_id.to_string(),
                status: ProgressStatus::Pending,
                progress: 0,
                current_task: String::new(),
                last_update: Utc::now(),
            });

        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(progress) = update.progress {
            entry.progress = progress.min(100);
        }
        if let Some(current_task) = update.current_task {
            entry.current_task = current_task;
        }
        entry.last_update = Utc::now();

        if let Some(ledger) = &self.ledger {
            if let Ok(line) = serde_json::to_string(entry) {
                ledger.send_line(line);
            }
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<ProgressEntry> {
        let entries = self.entries.read().await;
        entries.get(task_id).cloned()
    }

    pub async fn all(&self) -> Vec<ProgressEntry> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    pub async fn active(&self) -> Vec<ProgressEntry> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.status.is_active())
            .cloned()
            .collect()
    }

    pub async fn completed(&self) -> Vec<ProgressEntry> {
        self.by_status(ProgressStatus::Completed).await
    }

    pub async fn failed(&self) -> Vec<ProgressEntry> {
        self.by_status(ProgressStatus::Failed).await
    }

    async fn by_status(&self, status: ProgressStatus) -> Vec<ProgressEntry> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    /// Arithmetic mean of all records' progress; 0 when the tracker is empty.
    pub async fn overall_progress(&self) -> f64 {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return 0.0;
        }
        let sum: u64 = entries.values().map(|e| e.progress as u64).sum();
        sum as f64 / entries.len() as f64
    }

    /// True only when at least one record exists and every record has
    /// finished (completed or failed).
    pub async fn is_all_completed(&self) -> bool {
        let entries = self.entries.read().await;
        !entries.is_empty() && entries.values().all(|e| e.status.is_finished())
    }

    pub async fn has_failures(&self) -> bool {
        let entries = self.entries.read().await;
        entries.values().any(|e| e.status == ProgressStatus::Failed)
    }

    /// Purges records whose `last_update` age exceeds `max_age`; returns the
    /// number removed.
    pub async fn remove_stale_entries(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.last_update >= cutoff);
        before - entries.len()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(tracker: &ProgressTracker, id: &str, status: ProgressStatus, progress: u8) {
        tracker
            .update_progress(
                id,
                ProgressUpdate {
                    status: Some(status),
                    progress: Some(progress),
                    ..ProgressUpdate::default()
                },
            )
            .await;
    }

    #[tokio::test]
    async fn upsert_preserves_unspecified_fields() {
        let tracker = ProgressTracker::new();
        tracker
            .update_progress(
                "t1",
                ProgressUpdate {
                    name: Some("coder".into()),
                    status: Some(ProgressStatus::Running),
                    progress: Some(30),
                    current_task: Some("writing tests".into()),
                },
            )
            .await;
        tracker
            .update_progress(
                "t1",
                ProgressUpdate {
                    progress: Some(60),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        let entry = tracker.get("t1").await.unwrap();
        assert_eq!(entry.name, "coder");
        assert_eq!(entry.status, ProgressStatus::Running);
        assert_eq!(entry.progress, 60);
        assert_eq!(entry.current_task, "writing tests");
    }

    #[tokio::test]
    async fn progress_is_clamped_to_100() {
        let tracker = ProgressTracker::new();
        seed(&tracker, "t1", ProgressStatus::Running, 250).await;
        assert_eq!(tracker.get("t1").await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn overall_progress_is_the_mean() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.overall_progress().await, 0.0);

        seed(&tracker, "a", ProgressStatus::Completed, 100).await;
        seed(&tracker, "b", ProgressStatus::Running, 50).await;
        seed(&tracker, "c", ProgressStatus::Pending, 0).await;
        assert_eq!(tracker.overall_progress().await, 50.0);
    }

    #[tokio::test]
    async fn is_all_completed_semantics() {
        let tracker = ProgressTracker::new();
        // Empty tracker is not "all completed".
        assert!(!tracker.is_all_completed().await);

        seed(&tracker, "a", ProgressStatus::Completed, 100).await;
        seed(&tracker, "b", ProgressStatus::Waiting, 40).await;
        assert!(!tracker.is_all_completed().await);

        seed(&tracker, "b", ProgressStatus::Failed, 40).await;
        assert!(tracker.is_all_completed().await);
        assert!(tracker.has_failures().await);
    }

    #[tokio::test]
    async fn active_covers_running_and_waiting() {
        let tracker = ProgressTracker::new();
        seed(&tracker, "a", ProgressStatus::Running, 10).await;
        seed(&tracker, "b", ProgressStatus::Waiting, 20).await;
        seed(&tracker, "c", ProgressStatus::Completed, 100).await;
        assert_eq!(tracker.active().await.len(), 2);
        assert_eq!(tracker.completed().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_purged() {
        let tracker = ProgressTracker::new();
        seed(&tracker, "old", ProgressStatus::Completed, 100).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        seed(&tracker, "fresh", ProgressStatus::Running, 10).await;

        let removed = tracker.remove_stale_entries(Duration::from_millis(10)).await;
        assert_eq!(removed, 1);
        assert!(tracker.get("old").await.is_none());
        assert!(tracker.get("fresh").await.is_some());
    }
}
