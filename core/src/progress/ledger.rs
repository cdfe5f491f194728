use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sender half of the append-only progress ledger. Non-blocking: when the
/// writer falls behind, records are dropped and counted instead of stalling
/// the orchestrator.
#[derive(Clone)]
pub struct LedgerTx {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl LedgerTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn send_line(&self, line: String) {
        if self.tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Spawns the ledger appender task. Each line is one JSON-serialized progress
/// record; the file is replay-last-wins on read.
pub fn spawn_ledger_writer(
    path: String,
    capacity: usize,
) -> (LedgerTx, JoinHandle<std::io::Result<()>>) {
    let (tx, mut rx) = mpsc::channel::<String>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(async move {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        while let Some(line) = rx.recv().await {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await
    });

    (LedgerTx { tx, dropped }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let (tx, task) = spawn_ledger_writer(path.to_string_lossy().into_owned(), 8);

        tx.send_line(r#"{"id":"a","progress":10}"#.to_string());
        tx.send_line(r#"{"id":"a","progress":100}"#.to_string());
        drop(tx);
        task.await.unwrap().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("100"));
    }
}
