use std::sync::Arc;

use async_trait::async_trait;

use crate::task::types::{CompletionRequest, DelegationRequest};

use super::parser::{DirectiveParser, RegexDirectiveParser};
use super::types::ToolCall;

/// The controller side of directive dispatch. Implemented by the orchestrator;
/// the handler only translates parsed directives into these calls.
#[async_trait]
pub trait OrchestrationController: Send + Sync {
    /// Creates a subtask under `parent_id` and returns the new task id.
    async fn delegate_task(
        &self,
        parent_id: &str,
        request: DelegationRequest,
    ) -> anyhow::Result<String>;

    /// Records completion of `task_id` with the given result.
    async fn complete_task(&self, task_id: &str, request: CompletionRequest)
        -> anyhow::Result<()>;
}

/// Extracts delegation/completion directives from worker output and dispatches
/// them against the bound controller.
pub struct OrchestrationHandler {
    controller: Arc<dyn OrchestrationController>,
    parser: Box<dyn DirectiveParser>,
}

impl OrchestrationHandler {
    pub fn new(controller: Arc<dyn OrchestrationController>) -> Self {
        Self {
            controller,
            parser: Box::new(RegexDirectiveParser::new()),
        }
    }

    pub fn with_parser(
        controller: Arc<dyn OrchestrationController>,
        parser: Box<dyn DirectiveParser>,
    ) -> Self {
        Self { controller, parser }
    }

    /// Cheap pre-check so ordinary output chunks avoid the full regex scan.
    pub fn has_orchestration_tools(&self, text: &str) -> bool {
        self.parser.has_directives(text)
    }

    pub fn parse_output(&self, text: &str) -> Vec<ToolCall> {
        self.parser.parse_output(text)
    }

    /// Executes calls sequentially on behalf of `task_id`. A failing call is
    /// turned into a human-readable error line and does not block the rest.
    pub async fn process_tool_calls(&self, task_id: &str, calls: Vec<ToolCall>) -> Vec<String> {
        let mut acks = Vec::with_capacity(calls.len());
        for call in calls {
            let name = call.name();
            let outcome = match call {
                ToolCall::NewTask(request) => self.handle_new_task(task_id, request).await,
                ToolCall::AttemptCompletion(request) => {
                    self.handle_attempt_completion(task_id, request).await
                }
            };
            match outcome {
                Ok(ack) => acks.push(ack),
                Err(e) => {
                    tracing::warn!(error.kind = "orchestration.tool_failed", tool = name, task_id = %task_id, error.message = %e);
                    acks.push(format!("Error executing {name}: {e}"));
                }
            }
        }
        acks
    }

    /// Emits a delegation request and acknowledges immediately; the subtask
    /// outcome arrives asynchronously through the parent's resume message.
    async fn handle_new_task(
        &self,
        parent_id: &str,
        request: DelegationRequest,
    ) -> anyhow::Result<String> {
        let mode = request.mode.clone();
        let child_id = self.controller.delegate_task(parent_id, request).await?;
        Ok(format!(
            "Delegated to {mode} agent as task {child_id}; parent is paused until it finishes"
        ))
    }

    async fn handle_attempt_completion(
        &self,
        task_id: &str,
        request: CompletionRequest,
    ) -> anyhow::Result<String> {
        self.controller.complete_task(task_id, request).await?;
        Ok(format!("Completion recorded for task {task_id}"))
    }
}
