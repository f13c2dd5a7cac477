//! Syscall Error Taxonomy
//!
//! Every failure inside the syscall layer is one of the variants below.
//! They are recovered at the syscall boundary and surfaced to user code
//! as a single sentinel value.
//!
//! # Security Considerations
//! - User code never learns *why* a call failed (no distinguishing codes)
//! - No variant is fatal to the calling process
//! - The detailed reason is only visible in kernel logs

use core::fmt;

use crate::mm::Fault;

/// Result type used throughout the syscall layer.
pub type SysResult<T> = Result<T, SyscallError>;

/// Reasons a syscall can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Integer argument out of range (negative count, negative argc, ...).
    InvalidArgument,
    /// Name is empty, unterminated, oversized or unreachable.
    InvalidName,
    /// Descriptor is out of range, reserved, or not allocated.
    InvalidDescriptor,
    /// User buffer is not mapped or not writable.
    BadAddress,
    /// File, program image or process does not exist.
    NotFound,
    /// Descriptor table, file store or process table is exhausted.
    TableFull,
    /// Caller is not allowed to perform the operation.
    PermissionDenied,
    /// The child was already reaped by an earlier join.
    AlreadyReaped,
    /// The kernel is shutting down.
    ShuttingDown,
    /// Unknown system call number.
    NotSupported,
}

impl SyscallError {
    /// Value returned to user code for every failure.
    pub const SENTINEL: i32 = -1;

    /// Collapse this error to the user-visible return value.
    #[inline]
    pub const fn as_return(self) -> i32 {
        Self::SENTINEL
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidName => write!(f, "invalid name"),
            Self::InvalidDescriptor => write!(f, "invalid file descriptor"),
            Self::BadAddress => write!(f, "bad user address"),
            Self::NotFound => write!(f, "no such file or process"),
            Self::TableFull => write!(f, "table full"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::AlreadyReaped => write!(f, "process already reaped"),
            Self::ShuttingDown => write!(f, "kernel shutting down"),
            Self::NotSupported => write!(f, "unknown system call"),
        }
    }
}

impl From<Fault> for SyscallError {
    fn from(_: Fault) -> Self {
        Self::BadAddress
    }
}
