use crate::task::types::{CompletionRequest, DelegationRequest};

/// A structured orchestration directive extracted from free-form worker
/// output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    NewTask(DelegationRequest),
    AttemptCompletion(CompletionRequest),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewTask(_) => "new_task",
            Self::AttemptCompletion(_) => "attempt_completion",
        }
    }
}
