//! Kernel limits

use crate::mm::PAGE_SIZE;

/// Maximum length of one `exec` argument string in bytes.
pub const MAX_ARG_LEN: usize = 256;

/// Tunable limits of the syscall layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Entries in the file store, including unlinked files still open.
    pub max_files: usize,
    /// Processes in the process table, running or zombie.
    pub max_processes: usize,
    /// Upper bound on `exec`'s argument count.
    pub max_args: usize,
    /// Total bytes of argument strings `exec` accepts.
    pub arg_bytes: usize,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            max_files: 256,
            max_processes: 64,
            // One page of 32-bit argv pointers.
            max_args: PAGE_SIZE / 4,
            arg_bytes: PAGE_SIZE,
        }
    }

    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub const fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    pub const fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args;
        self
    }

    pub const fn with_arg_bytes(mut self, arg_bytes: usize) -> Self {
        self.arg_bytes = arg_bytes;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
