//! Execution collaborators
//!
//! The syscall layer does not run user code. It hands a loaded image to an
//! [`ExecutionEngine`] and parks blocked callers through a [`Scheduler`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::process::UserProcess;
use super::table::Pid;
use crate::error::SysResult;
use crate::fs::FileName;
use crate::kernel::Kernel;
use crate::mm::AddressSpace;

/// Suspends and resumes processes.
///
/// Wakeups are permits: a `wake` delivered before the matching `block`
/// makes that `block` return immediately.
pub trait Scheduler: Send + Sync {
    /// Suspend the calling process until it is woken.
    fn block(&self, pid: Pid);

    /// Make `pid` runnable, or leave a permit if it is not blocked.
    fn wake(&self, pid: Pid);
}

/// A program to load, with its validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    /// Name of the executable in the file namespace.
    pub name: FileName,
    /// Argument strings, without terminators.
    pub args: Vec<Vec<u8>>,
}

/// Loads and runs user programs.
pub trait ExecutionEngine: Send + Sync {
    /// Build the address space for `image`.
    ///
    /// Fails with `NotFound` if the image cannot be loaded.
    fn load(&self, image: &ProgramImage) -> SysResult<Box<dyn AddressSpace>>;

    /// Begin running `process`.
    ///
    /// The engine must eventually call [`Kernel::exit`] or
    /// [`Kernel::abort`] for the process, unless the kernel halts first.
    fn start(&self, kernel: Arc<Kernel>, process: UserProcess, image: ProgramImage);
}
