//! Process lifecycle
//!
//! - [`ProcessTable`]: who is running, who is a zombie, who may join whom
//! - [`UserProcess`]: per-process kernel state
//! - [`ExecutionEngine`] and [`Scheduler`]: the collaborators that run and
//!   suspend user code

mod engine;
mod process;
mod table;

pub use engine::{ExecutionEngine, ProgramImage, Scheduler};
pub use process::UserProcess;
pub use table::{JoinPoll, Pid, ProcessState, ProcessTable, TerminateOutcome, Termination};
