//! Address-Space Translator Interface
//!
//! The syscall layer never touches user memory directly. Every transfer
//! goes through an [`AddressSpace`], which either copies the full range
//! or reports a [`Fault`].
//!
//! # Security Principles
//! - A transfer is all-or-nothing: partial copies are reported as faults
//! - String reads are bounded: the terminator must appear within the probe
//! - Faults are values, the caller decides what they mean

use alloc::vec::Vec;
use core::fmt;

use super::address::{UserAddr, PAGE_SIZE};

/// Why a user memory access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The address is not mapped in the process.
    Unmapped,
    /// The page is mapped read-only and a write was attempted.
    ReadOnly,
    /// The range wraps around the end of the address space.
    Overflow,
}

/// A failed user memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// First address that could not be accessed.
    pub addr: UserAddr,
    /// Kind of violation.
    pub kind: FaultKind,
}

impl Fault {
    /// Create a new fault record.
    pub const fn new(addr: UserAddr, kind: FaultKind) -> Self {
        Self { addr, kind }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Unmapped => write!(f, "unmapped address {}", self.addr),
            FaultKind::ReadOnly => write!(f, "write to read-only address {}", self.addr),
            FaultKind::Overflow => write!(f, "address range overflow at {}", self.addr),
        }
    }
}

/// Access direction for range checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Kernel reads from user memory.
    Read,
    /// Kernel writes into user memory.
    Write,
}

/// A user process's view of memory, as seen by the kernel.
pub trait AddressSpace: Send {
    /// Check that every byte of `[addr, addr + len)` is accessible.
    ///
    /// A zero-length range is always accessible.
    fn check_range(&self, addr: UserAddr, len: usize, access: AccessKind) -> Result<(), Fault>;

    /// Copy `buf.len()` bytes out of user memory.
    fn read_bytes(&self, addr: UserAddr, buf: &mut [u8]) -> Result<(), Fault>;

    /// Copy `data` into user memory.
    fn write_bytes(&mut self, addr: UserAddr, data: &[u8]) -> Result<(), Fault>;

    /// Read a NUL-terminated string of at most `max_len` bytes.
    ///
    /// Probes at most `max_len + 1` bytes. Returns `Ok(None)` if no
    /// terminator was found within the probe, and a fault if the string
    /// runs into unmapped memory before its terminator.
    fn read_cstr(&self, addr: UserAddr, max_len: usize) -> Result<Option<Vec<u8>>, Fault> {
        let probe = max_len.saturating_add(1);
        let mut bytes = Vec::new();
        let mut cursor = addr;

        while bytes.len() < probe {
            // Never read across a page boundary in one step, so that a
            // terminator before an unmapped page is still found.
            let in_page = PAGE_SIZE - cursor.page_offset();
            let chunk_len = in_page.min(probe - bytes.len());
            let mut page = [0u8; PAGE_SIZE];
            let chunk = &mut page[..chunk_len];

            self.read_bytes(cursor, chunk)?;

            if let Some(end) = chunk.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..end]);
                return Ok(Some(bytes));
            }
            bytes.extend_from_slice(chunk);

            cursor = cursor
                .checked_add(chunk_len)
                .ok_or(Fault::new(cursor, FaultKind::Overflow))?;
        }

        Ok(None)
    }

    /// Read a little-endian 32-bit word.
    fn read_u32(&self, addr: UserAddr) -> Result<u32, Fault> {
        let mut word = [0u8; 4];
        self.read_bytes(addr, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian 32-bit word.
    fn write_i32(&mut self, addr: UserAddr, value: i32) -> Result<(), Fault> {
        self.write_bytes(addr, &value.to_le_bytes())
    }
}
