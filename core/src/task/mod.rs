mod stack;
mod store;
pub mod types;

pub use stack::{TaskStack, TaskStackEntry};
pub use store::TaskStore;
pub use types::{
    CompletionRequest, DelegationRequest, Task, TaskEvent, TaskNode, TaskStatus, TaskUpdate,
};
