mod manager;
mod patterns;

pub use manager::{FileOperation, SafetyManager, SafetyViolation, SessionStats};
