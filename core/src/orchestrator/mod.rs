mod engine;

pub use engine::{RootTaskOptions, TaskOrchestrator};
