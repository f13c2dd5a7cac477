//! System Call Input Validation
//!
//! Turns raw syscall registers into typed, checked values before any
//! kernel table is touched.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Prevent common vulnerabilities:
//!   - Buffer overflows (every range is checked against the address space)
//!   - Unbounded reads (strings are probed to a fixed limit)
//!   - TOCTOU races (names and arguments are copied into kernel memory)
//!   - Null pointer dereference (explicit checks)

use alloc::vec::Vec;

use crate::config::{KernelConfig, MAX_ARG_LEN};
use crate::error::{SysResult, SyscallError};
use crate::fs::{FileName, MAX_NAME_LEN};
use crate::mm::{AccessKind, AddressSpace, UserAddr};

/// Size of one argv entry in user memory.
const ARGV_ENTRY: usize = 4;

/// Read a file name out of user memory.
///
/// # Arguments
/// * `memory` - Caller's address space
/// * `raw` - Pointer register
///
/// # Returns
/// * `Ok(FileName)` - Name copied into kernel memory
/// * `Err(InvalidName)` - Null, negative or unmapped pointer, no
///   terminator within the limit, empty or malformed name
pub fn user_file_name(memory: &dyn AddressSpace, raw: i32) -> SysResult<FileName> {
    let addr = UserAddr::from_register(raw)
        .filter(|addr| !addr.is_null())
        .ok_or(SyscallError::InvalidName)?;

    let bytes = memory
        .read_cstr(addr, MAX_NAME_LEN)
        .map_err(|_| SyscallError::InvalidName)?
        .ok_or(SyscallError::InvalidName)?;

    FileName::from_bytes(&bytes)
}

/// Convert a count register to a length.
pub fn transfer_count(raw: i32) -> SysResult<usize> {
    usize::try_from(raw).map_err(|_| SyscallError::InvalidArgument)
}

/// Check that a user buffer is accessible in the given direction.
///
/// # Security Checks
/// 1. Zero-length buffers are always valid, whatever the pointer
/// 2. Pointer is non-negative and non-null
/// 3. Every page of the range is mapped (and writable, for `Write`)
pub fn user_buffer(
    memory: &dyn AddressSpace,
    raw: i32,
    len: usize,
    access: AccessKind,
) -> SysResult<UserAddr> {
    if len == 0 {
        return Ok(UserAddr::from_register(raw).unwrap_or(UserAddr::NULL));
    }

    let addr = UserAddr::from_register(raw)
        .filter(|addr| !addr.is_null())
        .ok_or(SyscallError::BadAddress)?;

    memory.check_range(addr, len, access)?;
    Ok(addr)
}

/// Copy `exec`'s argument vector into kernel memory.
///
/// `argv` is an array of `argc` little-endian 32-bit pointers, each
/// naming a NUL-terminated string.
///
/// # Returns
/// * `Ok(args)` - Argument strings without terminators
/// * `Err(InvalidArgument)` - `argc` out of range, an argument too long,
///   or the arguments together exceed `config.arg_bytes`
/// * `Err(BadAddress)` - `argv` or one of its entries is unreachable
pub fn user_argv(
    memory: &dyn AddressSpace,
    argv_raw: i32,
    argc_raw: i32,
    config: &KernelConfig,
) -> SysResult<Vec<Vec<u8>>> {
    let argc = usize::try_from(argc_raw).map_err(|_| SyscallError::InvalidArgument)?;
    if argc > config.max_args {
        return Err(SyscallError::InvalidArgument);
    }
    if argc == 0 {
        return Ok(Vec::new());
    }

    let argv = user_buffer(memory, argv_raw, argc * ARGV_ENTRY, AccessKind::Read)?;

    let mut args = Vec::with_capacity(argc);
    let mut total = 0usize;
    for i in 0..argc {
        let entry = argv
            .checked_add(i * ARGV_ENTRY)
            .ok_or(SyscallError::BadAddress)?;
        let ptr = UserAddr::new(memory.read_u32(entry)? as usize);
        if ptr.is_null() {
            return Err(SyscallError::BadAddress);
        }

        let arg = memory
            .read_cstr(ptr, MAX_ARG_LEN)?
            .ok_or(SyscallError::InvalidArgument)?;

        // Terminators count against the budget.
        total += arg.len() + 1;
        if total > config.arg_bytes {
            return Err(SyscallError::InvalidArgument);
        }
        args.push(arg);
    }

    Ok(args)
}
