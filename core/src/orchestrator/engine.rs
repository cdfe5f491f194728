use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::directive::{OrchestrationController, OrchestrationHandler};
use crate::error::OrchestratorError;
use crate::progress::{spawn_ledger_writer, ProgressStatus, ProgressTracker, ProgressUpdate};
use crate::safety::{SafetyManager, SessionStats};
use crate::task::types::{
    CompletionRequest, DelegationRequest, Task, TaskEvent, TaskNode, TaskStatus, TaskUpdate,
};
use crate::task::{TaskStack, TaskStore};
use crate::worker::{
    pump_stderr, pump_stdout, spawn_input_writer, LineStream, LineTap, Signal, WorkerOutcome,
    WorkerPlugin, WorkerSession, WorkerStartArgs,
};

/// Options for a root task; subtasks get the equivalent fields from their
/// `new_task` directive.
#[derive(Debug, Clone, Default)]
pub struct RootTaskOptions {
    pub tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub envs: HashMap<String, String>,
}

/// Channels bound to one live worker: its stdin feed and the abort trigger
/// of its driver loop.
struct WorkerBinding {
    input_tx: mpsc::Sender<String>,
    abort_tx: mpsc::Sender<String>,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    store: TaskStore,
    stack: TaskStack,
    safety: SafetyManager,
    progress: ProgressTracker,
    plugin: Arc<dyn WorkerPlugin>,
    workers: RwLock<HashMap<String, WorkerBinding>>,
    /// Serializes validate+create so concurrent delegations cannot race the
    /// global task counter past its limit.
    create_lock: Mutex<()>,
    /// Signalled on every terminal transition; `wait_for_completion` blocks
    /// on it instead of polling.
    done: Notify,
}

/// Top-level controller. Owns the task map and the worker bindings, wires the
/// stack, safety gate, directive handler, and progress ledger together, and
/// implements the pause/resume state machine:
///
/// ```text
/// pending → running → {paused ⇄ running} → {completed | failed}
/// ```
///
/// `paused` is entered only when a task delegates a child and exits only when
/// that child reaches a terminal state (or the task is force-stopped).
#[derive(Clone)]
pub struct TaskOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl TaskOrchestrator {
    pub fn new(config: OrchestratorConfig, plugin: Arc<dyn WorkerPlugin>) -> Self {
        let store = TaskStore::new();
        let stack = TaskStack::new(store.clone(), config.safety.max_stack_depth);
        let safety = SafetyManager::new(config.safety.clone());

        let progress = match &config.progress.ledger_path {
            Some(path) => {
                let (tx, _writer) =
                    spawn_ledger_writer(path.clone(), config.progress.ledger_channel_capacity);
                ProgressTracker::with_ledger(tx)
            }
            None => ProgressTracker::new(),
        };

        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                store,
                stack,
                safety,
                progress,
                plugin,
                workers: RwLock::new(HashMap::new()),
                create_lock: Mutex::new(()),
                done: Notify::new(),
            }),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.stack.subscribe()
    }

    pub fn stack(&self) -> &TaskStack {
        &self.inner.stack
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.inner.progress
    }

    pub fn safety(&self) -> &SafetyManager {
        &self.inner.safety
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.store.get(task_id).await
    }

    pub async fn session_stats(&self) -> SessionStats {
        self.inner.safety.session_stats(self.inner.store.len().await)
    }

    /// Creates and starts a root task: depth 0, root id pointing at itself.
    pub async fn create_root_task(
        &self,
        mode: &str,
        instruction: &str,
        options: RootTaskOptions,
    ) -> Result<String, OrchestratorError> {
        let _creating = self.inner.create_lock.lock().await;

        let snapshot = self.inner.store.snapshot().await;
        self.inner
            .safety
            .validate_task_creation(None, mode, &snapshot)?;

        let task = Task::new_root(
            Uuid::new_v4().to_string(),
            mode.to_string(),
            instruction.to_string(),
        );
        let task_id = task.id.clone();

        self.inner.store.insert(task.clone()).await;
        if let Err(violation) = self.inner.stack.push(&task).await {
            self.inner.store.remove(&task_id).await;
            return Err(violation.into());
        }

        self.record_initial_progress(&task).await;

        let max_turns = options
            .max_turns
            .unwrap_or(self.inner.config.worker.default_max_turns);
        if let Err(e) = self
            .start_task(&task, max_turns, options.tools, options.envs)
            .await
        {
            self.fail_task(&task_id, &format!("worker start failed: {e}"))
                .await;
            return Err(e);
        }

        tracing::info!(task_id = %task_id, mode = %mode, "root task started");
        Ok(task_id)
    }

    /// Creates and starts a child under `parent_id`, pausing the parent until
    /// the child reaches a terminal state.
    pub async fn create_subtask(
        &self,
        parent_id: &str,
        request: DelegationRequest,
    ) -> Result<String, OrchestratorError> {
        let _creating = self.inner.create_lock.lock().await;

        let parent = self
            .inner
            .store
            .get(parent_id)
            .await
            .ok_or_else(|| OrchestratorError::TaskNotFound(parent_id.to_string()))?;
        if !self.inner.store.contains(&parent.root_id).await {
            return Err(OrchestratorError::TaskNotFound(parent.root_id.clone()));
        }

        let snapshot = self.inner.store.snapshot().await;
        self.inner
            .safety
            .validate_task_creation(Some(&parent), &request.mode, &snapshot)?;

        let child = Task::new_child(
            Uuid::new_v4().to_string(),
            request.mode.clone(),
            request.instruction.clone(),
            &parent,
        );
        let child_id = child.id.clone();

        self.inner.store.insert(child.clone()).await;
        if let Err(violation) = self.inner.stack.push(&child).await {
            self.inner.store.remove(&child_id).await;
            return Err(violation.into());
        }

        self.inner
            .store
            .update(parent_id, |p| p.children.push(child_id.clone()))
            .await;

        self.record_initial_progress(&child).await;
        self.pause_task(parent_id).await?;

        let max_turns = request
            .max_turns
            .unwrap_or(self.inner.config.worker.default_max_turns);
        if let Err(e) = self
            .start_task(&child, max_turns, request.tools, HashMap::new())
            .await
        {
            // fail_task resumes the paused parent with the failure message.
            self.fail_task(&child_id, &format!("worker start failed: {e}"))
                .await;
            return Err(e);
        }

        tracing::info!(task_id = %child_id, parent_id = %parent_id, mode = %request.mode, depth = child.depth, "subtask started");
        Ok(child_id)
    }

    /// Terminal success transition: stores the result, stops the worker,
    /// removes the task from the stack, and resumes the parent if any.
    pub async fn complete_task(
        &self,
        task_id: &str,
        request: CompletionRequest,
    ) -> Result<(), OrchestratorError> {
        let task = self
            .inner
            .store
            .get(task_id)
            .await
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        if task.status.is_terminal() {
            return Ok(());
        }

        self.inner
            .stack
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    result: Some(request.result.clone()),
                    is_paused: Some(false),
                },
            )
            .await;
        self.inner.stack.remove_task(task_id).await;
        self.stop_worker(task_id, "task completed").await;

        self.inner
            .progress
            .update_progress(
                task_id,
                ProgressUpdate {
                    status: Some(ProgressStatus::Completed),
                    progress: Some(100),
                    current_task: request.summary.clone(),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        tracing::info!(task_id = %task_id, "task completed");

        if let Some(parent_id) = &task.parent_id {
            let message = format!(
                "Subtask {} ({}) completed with result: {}",
                task_id, task.mode, request.result
            );
            self.resume_parent_task(parent_id, &message).await;
        }

        self.inner.done.notify_waiters();
        Ok(())
    }

    /// Marks a task paused while it waits on a child. Bookkeeping only: the
    /// worker process keeps running, blocked on its input channel, and still
    /// holds its resources.
    pub async fn pause_task(&self, task_id: &str) -> Result<(), OrchestratorError> {
        let updated = self
            .inner
            .stack
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Paused),
                    is_paused: Some(true),
                    ..TaskUpdate::default()
                },
            )
            .await;
        if !updated {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }

        self.inner
            .progress
            .update_progress(
                task_id,
                ProgressUpdate {
                    status: Some(ProgressStatus::Waiting),
                    current_task: Some("waiting on subtask".to_string()),
                    ..ProgressUpdate::default()
                },
            )
            .await;
        Ok(())
    }

    /// Clears the pause mark and forwards `completion_message` into the
    /// parent worker's input channel so its own reasoning can continue.
    /// Communication failure here is logged, not fatal.
    pub async fn resume_parent_task(&self, parent_id: &str, completion_message: &str) {
        let Some(parent) = self.inner.store.get(parent_id).await else {
            tracing::warn!(parent_id = %parent_id, "resume requested for unknown parent");
            return;
        };
        if parent.status.is_terminal() {
            return;
        }

        self.inner
            .stack
            .update_task(
                parent_id,
                TaskUpdate {
                    status: Some(TaskStatus::Running),
                    is_paused: Some(false),
                    ..TaskUpdate::default()
                },
            )
            .await;
        self.inner
            .progress
            .update_progress(
                parent_id,
                ProgressUpdate {
                    status: Some(ProgressStatus::Running),
                    current_task: Some("resumed after subtask".to_string()),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        let binding_tx = {
            let workers = self.inner.workers.read().await;
            workers.get(parent_id).map(|b| b.input_tx.clone())
        };
        match binding_tx {
            Some(tx) => {
                if tx.send(completion_message.to_string()).await.is_err() {
                    tracing::warn!(error.kind = "worker.resume_send_failed", parent_id = %parent_id, "parent input channel closed; resume message dropped");
                }
            }
            None => {
                tracing::warn!(error.kind = "worker.resume_send_failed", parent_id = %parent_id, "no live worker bound to parent");
            }
        }
    }

    /// Forceful terminal transition plus worker termination; abort path.
    pub async fn stop_task(&self, task_id: &str, reason: &str) -> Result<(), OrchestratorError> {
        if !self.inner.store.contains(task_id).await {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }
        tracing::warn!(task_id = %task_id, reason = %reason, "force-stopping task");
        self.fail_task(task_id, &format!("stopped: {reason}")).await;
        Ok(())
    }

    pub async fn stop_all_tasks(&self, reason: &str) {
        let live: Vec<String> = self
            .inner
            .store
            .all()
            .await
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        for task_id in live {
            self.fail_task(&task_id, &format!("stopped: {reason}")).await;
        }
        self.inner.stack.clear().await;
    }

    /// The authoritative reporting view: one tree per root task, rebuilt from
    /// the `children` links, independent of the stack's LIFO order.
    pub async fn get_task_hierarchy(&self) -> Vec<TaskNode> {
        let snapshot = self.inner.store.snapshot().await;
        self.inner
            .store
            .roots()
            .await
            .iter()
            .map(|root| build_node(root, &snapshot))
            .collect()
    }

    /// Resolves once no task remains in {pending, running, paused}. Blocks on
    /// a terminal-transition signal rather than polling.
    pub async fn wait_for_completion(&self) {
        loop {
            let notified = self.inner.done.notified();
            if !self.inner.store.has_live_tasks().await {
                return;
            }
            notified.await;
        }
    }

    async fn record_initial_progress(&self, task: &Task) {
        self.inner
            .progress
            .update_progress(
                &task.id,
                ProgressUpdate {
                    name: Some(task.mode.clone()),
                    status: Some(ProgressStatus::Pending),
                    progress: Some(0),
                    current_task: Some(task.instruction.clone()),
                },
            )
            .await;
    }

    /// Spawns the worker bound to `task`, delivers its instruction, and wires
    /// its streams into the driver loop.
    async fn start_task(
        &self,
        task: &Task,
        max_turns: u32,
        tools: Vec<String>,
        envs: HashMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        let args = WorkerStartArgs {
            task_id: task.id.clone(),
            mode: task.mode.clone(),
            max_turns,
            tools,
            envs,
        };
        let mut session = self
            .inner
            .plugin
            .start_session(&args)
            .await
            .map_err(|e| OrchestratorError::ProcessStart(e.to_string()))?;

        let stdin = session
            .stdin()
            .ok_or_else(|| OrchestratorError::ProcessStart("no stdin".into()))?;
        let stdout = session
            .stdout()
            .ok_or_else(|| OrchestratorError::ProcessStart("no stdout".into()))?;
        let stderr = session
            .stderr()
            .ok_or_else(|| OrchestratorError::ProcessStart("no stderr".into()))?;

        let worker_cfg = &self.inner.config.worker;
        let (input_tx, writer_err_rx, _writer) =
            spawn_input_writer(stdin, worker_cfg.input_channel_capacity);

        // A task that never received its instruction cannot proceed.
        input_tx
            .send(task.instruction.clone())
            .await
            .map_err(|_| {
                OrchestratorError::ProcessCommunication("instruction send failed".into())
            })?;

        let (line_tx, line_rx) =
            mpsc::channel::<LineTap>(worker_cfg.line_tap_channel_capacity);
        pump_stdout(stdout, line_tx.clone());
        pump_stderr(stderr, line_tx);

        let (abort_tx, abort_rx) = mpsc::channel::<String>(4);
        {
            let mut workers = self.inner.workers.write().await;
            workers.insert(task.id.clone(), WorkerBinding { input_tx, abort_tx });
        }

        self.inner
            .stack
            .update_task(&task.id, TaskUpdate::status(TaskStatus::Running))
            .await;
        self.inner
            .progress
            .update_progress(
                &task.id,
                ProgressUpdate {
                    status: Some(ProgressStatus::Running),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        let orchestrator = self.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            orchestrator
                .drive_worker(task_id, session, line_rx, abort_rx, writer_err_rx)
                .await;
        });

        Ok(())
    }

    /// Per-worker driver loop: routes output lines through the directive
    /// handler and wires stream closure / process exit to the terminal
    /// transition. Events for one task arrive in its worker's emit order;
    /// nothing is assumed about ordering across sibling drivers.
    async fn drive_worker(
        self,
        task_id: String,
        mut session: Box<dyn WorkerSession>,
        mut line_rx: mpsc::Receiver<LineTap>,
        mut abort_rx: mpsc::Receiver<String>,
        mut writer_err_rx: mpsc::Receiver<String>,
    ) {
        let handler = OrchestrationHandler::new(Arc::new(self.clone()));
        let mut saw_output = false;

        let (exit_outcome, abort_reason) = {
            let wait_fut = session.wait();
            tokio::pin!(wait_fut);

            let mut outcome: Option<anyhow::Result<WorkerOutcome>> = None;
            let mut reason: Option<String> = None;
            let mut lines_open = true;
            let mut abort_open = true;
            let mut writer_err_open = true;

            loop {
                tokio::select! {
                    res = &mut wait_fut => {
                        outcome = Some(res);
                        break;
                    }

                    maybe_abort = abort_rx.recv(), if abort_open => {
                        match maybe_abort {
                            Some(msg) => {
                                reason = Some(msg);
                                break;
                            }
                            None => abort_open = false,
                        }
                    }

                    maybe_err = writer_err_rx.recv(), if writer_err_open => {
                        match maybe_err {
                            Some(msg) if saw_output => {
                                // Pause/resume messaging is non-fatal.
                                tracing::warn!(error.kind = "worker.stdin_broken", task_id = %task_id, error.message = %msg);
                            }
                            Some(msg) => {
                                reason = Some(format!("instruction delivery failed: {msg}"));
                                break;
                            }
                            None => writer_err_open = false,
                        }
                    }

                    tap = line_rx.recv(), if lines_open => {
                        match tap {
                            Some(tap) => {
                                saw_output = true;
                                self.handle_worker_line(&handler, &task_id, tap).await;
                            }
                            None => lines_open = false,
                        }
                    }
                }
            }
            (outcome, reason)
        };

        if let Some(reason) = abort_reason {
            abort_sequence(
                &mut session,
                self.inner.config.worker.abort_grace_ms,
            )
            .await;
            self.cleanup_binding(&task_id).await;
            let still_live = self
                .inner
                .store
                .get(&task_id)
                .await
                .map(|t| !t.status.is_terminal())
                .unwrap_or(false);
            if still_live {
                self.fail_task(&task_id, &reason).await;
            }
            return;
        }

        // The process exited on its own, so its streams hit EOF and the pumps
        // drop their senders once fully forwarded. Completion directives often
        // land just before exit; drain them before the terminal transition.
        while let Some(tap) = line_rx.recv().await {
            self.handle_worker_line(&handler, &task_id, tap).await;
        }

        if let Some(outcome) = exit_outcome {
            self.on_worker_exit(&task_id, outcome).await;
        }
    }

    async fn handle_worker_line(
        &self,
        handler: &OrchestrationHandler,
        task_id: &str,
        tap: LineTap,
    ) {
        if tap.stream == LineStream::Stderr {
            // Diagnostic channel; never scanned for directives.
            tracing::debug!(target: "boomerang.worker", task_id = %task_id, line = %tap.line, "worker diagnostic");
            return;
        }

        if !handler.has_orchestration_tools(&tap.line) {
            return;
        }
        let calls = handler.parse_output(&tap.line);
        if calls.is_empty() {
            return;
        }
        for ack in handler.process_tool_calls(task_id, calls).await {
            tracing::info!(task_id = %task_id, ack = %ack, "orchestration tool processed");
        }
    }

    /// Terminal wiring for a worker that exited on its own: clean exit means
    /// completed, abnormal exit means failed and is propagated to the parent
    /// as a synthetic failure message.
    async fn on_worker_exit(&self, task_id: &str, outcome: anyhow::Result<WorkerOutcome>) {
        self.cleanup_binding(task_id).await;

        let Some(task) = self.inner.store.get(task_id).await else {
            return;
        };
        if task.status.is_terminal() {
            self.inner.done.notify_waiters();
            return;
        }

        match outcome {
            Ok(outcome) if outcome.is_clean() => {
                let _ = self
                    .complete_task(
                        task_id,
                        CompletionRequest {
                            result: "worker exited cleanly without reporting a result".into(),
                            summary: None,
                        },
                    )
                    .await;
            }
            Ok(outcome) => {
                self.fail_task(
                    task_id,
                    &format!("worker exited with code {}", outcome.exit_code),
                )
                .await;
            }
            Err(e) => {
                self.fail_task(task_id, &format!("worker wait failed: {e}"))
                    .await;
            }
        }
    }

    /// Terminal failure transition. A failed subtask resumes its parent with
    /// a failure description so the parent can retry, change strategy, or
    /// fail in turn; a failed root task ends the session.
    async fn fail_task(&self, task_id: &str, error: &str) {
        let Some(task) = self.inner.store.get(task_id).await else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }

        self.inner
            .stack
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Failed),
                    result: Some(error.to_string()),
                    is_paused: Some(false),
                },
            )
            .await;
        self.inner.stack.remove_task(task_id).await;
        self.stop_worker(task_id, error).await;

        self.inner
            .progress
            .update_progress(
                task_id,
                ProgressUpdate {
                    status: Some(ProgressStatus::Failed),
                    current_task: Some(error.to_string()),
                    ..ProgressUpdate::default()
                },
            )
            .await;

        match &task.parent_id {
            Some(parent_id) => {
                let message = format!(
                    "Subtask {} ({}) failed: {}. Decide whether to retry, adjust the approach, or report failure.",
                    task_id, task.mode, error
                );
                self.resume_parent_task(parent_id, &message).await;
            }
            None => {
                tracing::error!(task_id = %task_id, error.message = %error, "root task failed; session ends");
            }
        }

        self.inner.done.notify_waiters();
    }

    /// Unbinds the worker and triggers its driver's abort path, if it is
    /// still running.
    async fn stop_worker(&self, task_id: &str, reason: &str) {
        let binding = {
            let mut workers = self.inner.workers.write().await;
            workers.remove(task_id)
        };
        if let Some(binding) = binding {
            let _ = binding.abort_tx.try_send(reason.to_string());
        }
    }

    async fn cleanup_binding(&self, task_id: &str) {
        let mut workers = self.inner.workers.write().await;
        workers.remove(task_id);
    }
}

/// Graceful stop, then a hard kill after the grace interval.
async fn abort_sequence(session: &mut Box<dyn WorkerSession>, grace_ms: u64) {
    let _ = session.signal(Signal::Term).await;
    tokio::time::sleep(Duration::from_millis(grace_ms)).await;
    let _ = session.signal(Signal::Kill).await;
}

fn build_node(task: &Task, all: &HashMap<String, Task>) -> TaskNode {
    TaskNode {
        id: task.id.clone(),
        mode: task.mode.clone(),
        status: task.status,
        depth: task.depth,
        children: task
            .children
            .iter()
            .filter_map(|id| all.get(id))
            .map(|child| build_node(child, all))
            .collect(),
        start_time: task.created_at,
        end_time: task.status.is_terminal().then_some(task.updated_at),
        result: task.result.clone(),
    }
}

#[async_trait]
impl OrchestrationController for TaskOrchestrator {
    async fn delegate_task(
        &self,
        parent_id: &str,
        request: DelegationRequest,
    ) -> anyhow::Result<String> {
        self.create_subtask(parent_id, request)
            .await
            .map_err(anyhow::Error::new)
    }

    async fn complete_task(
        &self,
        task_id: &str,
        request: CompletionRequest,
    ) -> anyhow::Result<()> {
        TaskOrchestrator::complete_task(self, task_id, request)
            .await
            .map_err(anyhow::Error::new)
    }
}
