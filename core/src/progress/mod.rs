mod ledger;
mod tracker;

pub use ledger::{spawn_ledger_writer, LedgerTx};
pub use tracker::{ProgressEntry, ProgressStatus, ProgressTracker, ProgressUpdate};
