//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - All syscall numbers are validated against the whitelist
//! - Unknown syscalls return the failure sentinel
//! - Parameters are validated before any kernel table is touched
//! - No argument value, however hostile, kills the caller

use alloc::sync::Arc;

use log::{debug, trace, warn};

use super::validate;
use crate::error::{SysResult, SyscallError};
use crate::fs::{Access, Fd, OpenFile};
use crate::kernel::Kernel;
use crate::mm::{AccessKind, UserAddr, PAGE_SIZE};
use crate::proc::{Pid, ProgramImage, Termination, UserProcess};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: usize = 0;
    pub const SYS_EXIT: usize = 1;
    pub const SYS_EXEC: usize = 2;
    pub const SYS_JOIN: usize = 3;
    pub const SYS_CREAT: usize = 4;
    pub const SYS_OPEN: usize = 5;
    pub const SYS_READ: usize = 6;
    pub const SYS_WRITE: usize = 7;
    pub const SYS_CLOSE: usize = 8;
    pub const SYS_UNLINK: usize = 9;

    /// Name of a syscall for log messages.
    pub fn name(number: usize) -> &'static str {
        match number {
            SYS_HALT => "halt",
            SYS_EXIT => "exit",
            SYS_EXEC => "exec",
            SYS_JOIN => "join",
            SYS_CREAT => "creat",
            SYS_OPEN => "open",
            SYS_READ => "read",
            SYS_WRITE => "write",
            SYS_CLOSE => "close",
            SYS_UNLINK => "unlink",
            _ => "unknown",
        }
    }
}

/// What the execution engine should do after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Resume the caller with this value in its return register.
    Return(i32),
    /// The caller has terminated; do not resume it.
    Exited,
    /// The kernel has halted; stop running user code.
    Halted,
}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - Shared kernel state
/// * `process` - The calling process
/// * `number` - System call number
/// * `args` - Argument registers, in order
///
/// # Returns
/// How the engine should continue the caller
///
/// # Security
/// - Unknown syscall numbers are rejected with the sentinel
/// - Each handler validates its own arguments
/// - Every error is collapsed to -1 here and nowhere else
pub fn dispatch(
    kernel: &Arc<Kernel>,
    process: &mut UserProcess,
    number: usize,
    args: [i32; 4],
) -> Completion {
    if kernel.is_halted() {
        return Completion::Halted;
    }
    if process.is_terminated() {
        debug!("[SYSCALL] {} from terminated process {}", numbers::name(number), process.pid);
        return Completion::Return(SyscallError::SENTINEL);
    }

    trace!("[SYSCALL] {}: {}({:?})", process.pid, numbers::name(number), args);

    let result = match number {
        numbers::SYS_HALT => return sys_halt(kernel, process),
        numbers::SYS_EXIT => {
            kernel.exit(process, args[0]);
            return Completion::Exited;
        }
        numbers::SYS_EXEC => sys_exec(kernel, process, args[0], args[1], args[2]),
        numbers::SYS_JOIN => sys_join(kernel, process, args[0], args[1]),
        numbers::SYS_CREAT => sys_creat(kernel, process, args[0]),
        numbers::SYS_OPEN => sys_open(kernel, process, args[0]),
        numbers::SYS_READ => sys_read(kernel, process, args[0], args[1], args[2]),
        numbers::SYS_WRITE => sys_write(kernel, process, args[0], args[1], args[2]),
        numbers::SYS_CLOSE => sys_close(process, args[0]),
        numbers::SYS_UNLINK => sys_unlink(kernel, process, args[0]),
        _ => {
            warn!("[SYSCALL] Unknown syscall {} from {}", number, process.pid);
            Err(SyscallError::NotSupported)
        }
    };

    // A blocked join is released by a halt; the caller must not resume.
    if kernel.is_halted() {
        return Completion::Halted;
    }

    match result {
        Ok(value) => Completion::Return(value),
        Err(e) => {
            debug!(
                "[SYSCALL] {} failed for {}: {}",
                numbers::name(number),
                process.pid,
                e
            );
            Completion::Return(e.as_return())
        }
    }
}

/// Halt system call
///
/// # Security
/// Only the root process may halt; anyone else gets the sentinel and the
/// machine keeps running.
fn sys_halt(kernel: &Kernel, process: &UserProcess) -> Completion {
    match kernel.halt(process.pid) {
        Ok(()) => Completion::Halted,
        Err(e) => Completion::Return(e.as_return()),
    }
}

/// Exec system call
///
/// # Arguments
/// * `name_ptr` - Pointer to the program name
/// * `argc` - Number of arguments
/// * `argv_ptr` - Pointer to an array of `argc` string pointers
///
/// # Returns
/// Pid of the new child
fn sys_exec(
    kernel: &Arc<Kernel>,
    process: &UserProcess,
    name_ptr: i32,
    argc: i32,
    argv_ptr: i32,
) -> SysResult<i32> {
    let memory = process.memory();
    let name = validate::user_file_name(memory, name_ptr)?;
    let args = validate::user_argv(memory, argv_ptr, argc, kernel.config())?;

    let pid = kernel.spawn(Some(process.pid), ProgramImage { name, args })?;
    Ok(pid.as_raw())
}

/// Join system call
///
/// # Returns
/// 1 if the child exited normally, 0 if it was killed
///
/// # Security
/// - The status pointer is checked before the child is reaped, so a bad
///   pointer never consumes the child's result
/// - A null status pointer means the status is discarded
fn sys_join(
    kernel: &Kernel,
    process: &mut UserProcess,
    pid: i32,
    status_ptr: i32,
) -> SysResult<i32> {
    let child = Pid::from_register(pid).ok_or(SyscallError::NotFound)?;

    let status_addr = UserAddr::from_register(status_ptr).ok_or(SyscallError::BadAddress)?;
    if !status_addr.is_null() {
        process
            .memory()
            .check_range(status_addr, 4, AccessKind::Write)?;
    }

    match kernel.join(process.pid, child)? {
        Termination::Exited(status) => {
            if !status_addr.is_null() {
                process.memory.write_i32(status_addr, status)?;
            }
            Ok(1)
        }
        Termination::Killed => Ok(0),
    }
}

/// Creat system call
///
/// Creates or truncates a file and opens it on the lowest free descriptor.
fn sys_creat(kernel: &Kernel, process: &mut UserProcess, name_ptr: i32) -> SysResult<i32> {
    let name = validate::user_file_name(process.memory(), name_ptr)?;
    if !process.files.has_free_slot() {
        return Err(SyscallError::TableFull);
    }

    let handle = kernel.files().create(&name, process.pid)?;
    let fd = process.files.allocate(handle)?;
    debug!("[FS] {} created {} on {:?}", process.pid, name, fd);
    Ok(fd.as_raw())
}

/// Open system call
fn sys_open(kernel: &Kernel, process: &mut UserProcess, name_ptr: i32) -> SysResult<i32> {
    let name = validate::user_file_name(process.memory(), name_ptr)?;
    if !process.files.has_free_slot() {
        return Err(SyscallError::TableFull);
    }

    let handle = kernel.files().open(&name, process.pid)?;
    let fd = process.files.allocate(handle)?;
    Ok(fd.as_raw())
}

/// Read system call
///
/// Reads up to `count` bytes from a descriptor into a user buffer.
///
/// # Returns
/// Number of bytes read; 0 at end of file
///
/// # Security
/// - Descriptor must be open and readable
/// - The whole buffer must be mapped writable before anything is read
/// - Data moves through a page-sized kernel buffer
fn sys_read(
    kernel: &Kernel,
    process: &mut UserProcess,
    fd: i32,
    buf: i32,
    count: i32,
) -> SysResult<i32> {
    let count = validate::transfer_count(count)?;
    let fd = Fd::new(fd).ok_or(SyscallError::InvalidDescriptor)?;

    let UserProcess { files, memory, .. } = process;
    let file = files.resolve(fd)?;
    if !file.access().contains(Access::READ) {
        return Err(SyscallError::PermissionDenied);
    }
    let addr = validate::user_buffer(&**memory, buf, count, AccessKind::Write)?;

    let mut chunk = [0u8; PAGE_SIZE];
    let mut done = 0usize;
    while done < count {
        let want = (count - done).min(PAGE_SIZE);
        let got = match file {
            OpenFile::Stdin => kernel.console().read(&mut chunk[..want]),
            OpenFile::File(handle) => handle.read(&mut chunk[..want]),
            OpenFile::Stdout => 0,
        };
        if got == 0 {
            break;
        }

        let dst = addr.checked_add(done).ok_or(SyscallError::BadAddress)?;
        memory.write_bytes(dst, &chunk[..got])?;
        done += got;

        if got < want {
            break;
        }
    }

    Ok(done as i32)
}

/// Write system call
///
/// Writes `count` bytes from a user buffer to a descriptor.
///
/// # Returns
/// Number of bytes written
///
/// # Security
/// - Descriptor must be open and writable
/// - The whole buffer must be mapped before anything is written
fn sys_write(
    kernel: &Kernel,
    process: &mut UserProcess,
    fd: i32,
    buf: i32,
    count: i32,
) -> SysResult<i32> {
    let count = validate::transfer_count(count)?;
    let fd = Fd::new(fd).ok_or(SyscallError::InvalidDescriptor)?;

    let UserProcess { files, memory, .. } = process;
    let file = files.resolve(fd)?;
    if !file.access().contains(Access::WRITE) {
        return Err(SyscallError::PermissionDenied);
    }
    let addr = validate::user_buffer(&**memory, buf, count, AccessKind::Read)?;

    let mut chunk = [0u8; PAGE_SIZE];
    let mut done = 0usize;
    while done < count {
        let want = (count - done).min(PAGE_SIZE);
        let src = addr.checked_add(done).ok_or(SyscallError::BadAddress)?;
        memory.read_bytes(src, &mut chunk[..want])?;

        let put = match file {
            OpenFile::Stdout => kernel.console().write(&chunk[..want]),
            OpenFile::File(handle) => handle.write(&chunk[..want]),
            OpenFile::Stdin => 0,
        };
        done += put;

        if put < want {
            break;
        }
    }

    Ok(done as i32)
}

/// Close system call
///
/// # Security
/// The console descriptors and unopened descriptors are rejected.
fn sys_close(process: &mut UserProcess, fd: i32) -> SysResult<i32> {
    let fd = Fd::new(fd).ok_or(SyscallError::InvalidDescriptor)?;
    // Dropping the handle releases the store reference.
    drop(process.files.release(fd)?);
    Ok(0)
}

/// Unlink system call
fn sys_unlink(kernel: &Kernel, process: &UserProcess, name_ptr: i32) -> SysResult<i32> {
    let name = validate::user_file_name(process.memory(), name_ptr)?;
    kernel.files().unlink(&name)?;
    Ok(0)
}
