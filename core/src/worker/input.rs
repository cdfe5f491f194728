use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::WorkerError;

/// Spawns the writer task that owns a worker's stdin. Messages are plain text
/// lines: the initial instruction first, then resume/failure messages when a
/// child finishes. Write failures are reported on the error channel; the
/// caller decides whether they are fatal (initial send) or not (resume).
pub fn spawn_input_writer(
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
    channel_capacity: usize,
) -> (
    mpsc::Sender<String>,
    mpsc::Receiver<String>,
    tokio::task::JoinHandle<Result<(), WorkerError>>,
) {
    let (input_tx, mut input_rx) = mpsc::channel::<String>(channel_capacity);
    let (writer_err_tx, writer_err_rx) = mpsc::channel::<String>(1);

    let mut writer = InputWriter { stdin };
    let task = tokio::spawn(async move {
        while let Some(message) = input_rx.recv().await {
            if let Err(e) = writer.send(&message).await {
                let _ = writer_err_tx
                    .send(format!("stdin write failed: {}", e))
                    .await;
                break;
            }
        }
        Ok(())
    });

    (input_tx, writer_err_rx, task)
}

struct InputWriter {
    stdin: Box<dyn AsyncWrite + Unpin + Send>,
}

impl InputWriter {
    async fn send(&mut self, message: &str) -> std::io::Result<()> {
        self.stdin.write_all(message.as_bytes()).await?;
        if !message.ends_with('\n') {
            self.stdin.write_all(b"\n").await?;
        }
        self.stdin.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writes_newline_terminated_messages() {
        let (wr, mut rd) = tokio::io::duplex(1024);
        let (tx, _err_rx, task) = spawn_input_writer(Box::new(wr), 8);

        tx.send("first".to_string()).await.unwrap();
        tx.send("second\n".to_string()).await.unwrap();
        drop(tx);
        task.await.unwrap().unwrap();

        let mut out = String::new();
        rd.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "first\nsecond\n");
    }

    #[tokio::test]
    async fn broken_pipe_is_reported_on_error_channel() {
        let (wr, rd) = tokio::io::duplex(16);
        drop(rd);
        let (tx, mut err_rx, task) = spawn_input_writer(Box::new(wr), 8);

        tx.send("message".to_string()).await.unwrap();
        let err = err_rx.recv().await.expect("expected a writer error");
        assert!(err.contains("stdin write failed"));
        drop(tx);
        task.await.unwrap().unwrap();
    }
}
