//! Orchestration core for hierarchical delegated agent tasks.
//!
//! A running task can delegate a focused subtask to a child agent; the parent
//! pauses until the child reports back, then resumes with the child's result
//! injected into its input. The [`orchestrator::TaskOrchestrator`] owns that
//! lifecycle; worker process mechanics live behind the [`worker`] plugin seam.

pub mod api;
pub mod config;
pub mod directive;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod safety;
pub mod task;
pub mod worker;
