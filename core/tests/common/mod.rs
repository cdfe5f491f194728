use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{oneshot, Notify};

use boomerang_core::worker::{Signal, WorkerOutcome, WorkerPlugin, WorkerSession, WorkerStartArgs};

/// One scripted reaction per input line the fake worker receives: the first
/// action answers the instruction, later ones answer resume messages in order.
#[allow(dead_code)]
pub enum FakeAction {
    /// Print these stdout lines and keep running, waiting for more input.
    Emit(Vec<&'static str>),
    /// Print these stdout lines, then exit with the given code.
    EmitThenExit(Vec<&'static str>, i32),
}

/// In-process stand-in for a worker plugin. Sessions run over duplex pipes;
/// each started session consumes the next script registered for its mode.
pub struct FakeWorkerPlugin {
    scripts: Mutex<HashMap<String, VecDeque<Vec<FakeAction>>>>,
}

#[allow(dead_code)]
impl FakeWorkerPlugin {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_script(self, mode: &str, actions: Vec<FakeAction>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(mode.to_string())
            .or_default()
            .push_back(actions);
        self
    }
}

#[async_trait]
impl WorkerPlugin for FakeWorkerPlugin {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start_session(&self, args: &WorkerStartArgs) -> anyhow::Result<Box<dyn WorkerSession>> {
        let actions = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&args.mode)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| anyhow::anyhow!("no script registered for mode {}", args.mode))?;

        let (stdin_orch, stdin_fake) = tokio::io::duplex(64 * 1024);
        let (stdout_fake, stdout_orch) = tokio::io::duplex(64 * 1024);
        // The fake never writes diagnostics; dropping one end yields EOF.
        let (stderr_fake, stderr_orch) = tokio::io::duplex(64);
        drop(stderr_fake);

        let (exit_tx, exit_rx) = oneshot::channel::<i32>();
        tokio::spawn(run_fake_worker(stdin_fake, stdout_fake, actions, exit_tx));

        Ok(Box::new(FakeSession {
            stdin: Some(Box::new(stdin_orch)),
            stdout: Some(Box::new(stdout_orch)),
            stderr: Some(Box::new(stderr_orch)),
            exit_rx,
            killed: Notify::new(),
        }))
    }
}

async fn run_fake_worker(
    stdin: DuplexStream,
    mut stdout: DuplexStream,
    actions: Vec<FakeAction>,
    exit_tx: oneshot::Sender<i32>,
) {
    let mut actions = VecDeque::from(actions);
    let mut lines = BufReader::new(stdin).lines();
    let mut code = 0;

    while let Ok(Some(_input)) = lines.next_line().await {
        match actions.pop_front() {
            Some(FakeAction::Emit(out)) => {
                for line in out {
                    let _ = stdout.write_all(format!("{line}\n").as_bytes()).await;
                }
            }
            Some(FakeAction::EmitThenExit(out, exit_code)) => {
                for line in out {
                    let _ = stdout.write_all(format!("{line}\n").as_bytes()).await;
                }
                code = exit_code;
                break;
            }
            // Script exhausted: swallow further input until stdin closes.
            None => {}
        }
    }

    let _ = stdout.shutdown().await;
    drop(stdout);
    let _ = exit_tx.send(code);
}

struct FakeSession {
    stdin: Option<Box<dyn AsyncWrite + Unpin + Send>>,
    stdout: Option<Box<dyn AsyncRead + Unpin + Send>>,
    stderr: Option<Box<dyn AsyncRead + Unpin + Send>>,
    exit_rx: oneshot::Receiver<i32>,
    killed: Notify,
}

#[async_trait]
impl WorkerSession for FakeSession {
    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.stdin.take()
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stdout.take()
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stderr.take()
    }

    async fn signal(&mut self, _signal: Signal) -> anyhow::Result<()> {
        self.killed.notify_one();
        Ok(())
    }

    async fn wait(&mut self) -> anyhow::Result<WorkerOutcome> {
        let exit_rx = &mut self.exit_rx;
        let killed = &self.killed;
        tokio::select! {
            code = exit_rx => Ok(WorkerOutcome {
                exit_code: code.unwrap_or(-1),
                duration_ms: None,
            }),
            _ = killed.notified() => Ok(WorkerOutcome {
                exit_code: 137,
                duration_ms: None,
            }),
        }
    }
}
