// Process module - liveness, restart scheduling and start/stop control

mod controller;
mod monitor;
pub mod restart;
mod types;

pub use controller::ProcessController;
pub use monitor::{LivenessChecker, ProcessTable, SystemProcessTable};
pub use restart::{DebounceLock, RestartDecision, RestartReason, RestartScheduler, RestartWindow};
pub use types::{ProcessEntry, ProcessMarkerSet, StartOutcome};
