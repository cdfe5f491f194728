use thiserror::Error;

use crate::safety::SafetyViolation;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("task creation rejected: {0}")]
    CreationRejected(#[from] SafetyViolation),
    #[error("worker start failed: {0}")]
    ProcessStart(String),
    #[error("worker communication failed: {0}")]
    ProcessCommunication(String),
    #[error("orchestration tool failed: {0}")]
    ToolCall(String),
    #[error("worker failed: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("plugin error: {0}")]
    Plugin(#[from] anyhow::Error),
}
