mod process;

pub use process::{ProcessWorkerConfig, ProcessWorkerPlugin};
