use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::types::{Signal, WorkerOutcome, WorkerStartArgs};

/// One live worker process bound to one task. Stream handles can be taken
/// once each; the session keeps ownership of the process itself.
#[async_trait]
pub trait WorkerSession: Send {
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    async fn signal(&mut self, signal: Signal) -> anyhow::Result<()>;
    async fn wait(&mut self) -> anyhow::Result<WorkerOutcome>;
}

/// Spawning collaborator. Process mechanics (command lines, environments,
/// wall-clock timeouts) live behind this seam, outside the orchestration core.
#[async_trait]
pub trait WorkerPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn start_session(&self, args: &WorkerStartArgs)
        -> anyhow::Result<Box<dyn WorkerSession>>;
}
