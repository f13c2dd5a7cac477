//! Per-process kernel state
//!
//! Everything the dispatcher needs about the caller, owned by the
//! execution context running it. Nothing here is shared between processes.

use alloc::boxed::Box;

use super::table::Pid;
use crate::fs::HandleTable;
use crate::mm::AddressSpace;

/// Kernel-side state of one user process.
pub struct UserProcess {
    pub(crate) pid: Pid,
    pub(crate) files: HandleTable,
    pub(crate) memory: Box<dyn AddressSpace>,
    pub(crate) terminated: bool,
}

impl UserProcess {
    pub(crate) fn new(pid: Pid, memory: Box<dyn AddressSpace>) -> Self {
        Self {
            pid,
            files: HandleTable::new(),
            memory,
            terminated: false,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Descriptor table.
    pub fn files(&self) -> &HandleTable {
        &self.files
    }

    /// User memory, as the kernel sees it.
    pub fn memory(&self) -> &dyn AddressSpace {
        &*self.memory
    }

    /// Mutable user memory. Engines use this to place data for the
    /// program; user code itself never goes through here.
    pub fn memory_mut(&mut self) -> &mut dyn AddressSpace {
        &mut *self.memory
    }

    /// Check whether the kernel has already torn this process down.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl core::fmt::Debug for UserProcess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserProcess")
            .field("pid", &self.pid)
            .field("open_files", &self.files.open_count())
            .field("terminated", &self.terminated)
            .finish()
    }
}
