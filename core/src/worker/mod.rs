mod input;
mod io_pump;
mod traits;
pub mod types;

pub use input::spawn_input_writer;
pub use io_pump::{pump_stderr, pump_stdout, LineStream, LineTap};
pub use traits::{WorkerPlugin, WorkerSession};
pub use types::{Signal, WorkerOutcome, WorkerStartArgs};
