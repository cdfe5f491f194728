use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use boomerang_core::worker::{Signal, WorkerOutcome, WorkerPlugin, WorkerSession, WorkerStartArgs};

/// How the plugin launches agent workers. The same program is invoked for
/// every task; per-task parameters travel through the environment:
///
/// * `BOOMERANG_TASK_ID`
/// * `BOOMERANG_MODE`
/// * `BOOMERANG_MAX_TURNS`
/// * `BOOMERANG_TOOLS` (comma-joined, absent when the default set applies)
#[derive(Debug, Clone)]
pub struct ProcessWorkerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Wall-clock budget per worker; `wait` fails once it is exceeded and the
    /// process is killed.
    pub session_timeout: Option<Duration>,
}

impl Default for ProcessWorkerConfig {
    fn default() -> Self {
        Self {
            program: "agent-worker".to_string(),
            args: Vec::new(),
            session_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

/// Spawns one OS process per task with piped stdio.
pub struct ProcessWorkerPlugin {
    config: ProcessWorkerConfig,
}

impl ProcessWorkerPlugin {
    pub fn new(config: ProcessWorkerConfig) -> Self {
        Self { config }
    }
}

impl Default for ProcessWorkerPlugin {
    fn default() -> Self {
        Self::new(ProcessWorkerConfig::default())
    }
}

#[async_trait]
impl WorkerPlugin for ProcessWorkerPlugin {
    fn name(&self) -> &str {
        "process"
    }

    async fn start_session(&self, args: &WorkerStartArgs) -> Result<Box<dyn WorkerSession>> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .envs(&args.envs)
            .env("BOOMERANG_TASK_ID", &args.task_id)
            .env("BOOMERANG_MODE", &args.mode)
            .env("BOOMERANG_MAX_TURNS", args.max_turns.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !args.tools.is_empty() {
            command.env("BOOMERANG_TOOLS", args.tools.join(","));
        }

        let child = command.spawn()?;
        tracing::debug!(task_id = %args.task_id, mode = %args.mode, program = %self.config.program, "worker process spawned");

        Ok(Box::new(ProcessWorkerSession {
            child,
            started: Instant::now(),
            timeout: self.config.session_timeout,
        }))
    }
}

struct ProcessWorkerSession {
    child: Child,
    started: Instant,
    timeout: Option<Duration>,
}

#[async_trait]
impl WorkerSession for ProcessWorkerSession {
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn signal(&mut self, signal: Signal) -> Result<()> {
        // Graceful termination is platform specific; kill covers both for now.
        let _ = signal;
        let _ = self.child.kill().await;
        Ok(())
    }

    async fn wait(&mut self) -> Result<WorkerOutcome> {
        let status = match self.timeout {
            Some(timeout) => {
                let remaining = timeout.saturating_sub(self.started.elapsed());
                match tokio::time::timeout(remaining, self.child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        let _ = self.child.kill().await;
                        anyhow::bail!("worker session timed out after {}s", timeout.as_secs());
                    }
                }
            }
            None => self.child.wait().await?,
        };

        Ok(WorkerOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: Some(self.started.elapsed().as_millis() as u64),
        })
    }
}
