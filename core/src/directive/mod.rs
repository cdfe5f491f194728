mod handler;
mod parser;
mod types;

pub use handler::{OrchestrationController, OrchestrationHandler};
pub use parser::{DirectiveParser, RegexDirectiveParser, DEFAULT_MAX_TURNS};
pub use types::ToolCall;
