//! Per-process descriptor table
//!
//! A fixed array of slots addressed by small integer descriptors. Slots 0
//! and 1 hold the console streams for the life of the process.
//!
//! # Design
//! - Fixed-size array of descriptor slots
//! - Slots are addressed by [`Fd`] indices
//! - Operations: allocate, resolve, release
//!
//! # Security Properties
//! - Descriptors are range-checked before they become an [`Fd`]
//! - The reserved slots can never be closed or reassigned
//! - A released slot is empty; a stale descriptor resolves to an error

use core::fmt;

use super::handle::{Access, FileHandle};
use crate::error::{SysResult, SyscallError};

/// Number of slots in a descriptor table.
pub const MAX_OPEN_FILES: usize = 16;

/// A descriptor index, guaranteed to be inside the table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fd(u8);

impl Fd {
    /// Standard input.
    pub const STDIN: Self = Self(0);

    /// Standard output.
    pub const STDOUT: Self = Self(1);

    /// First descriptor available to `creat` and `open`.
    pub const FIRST_USER: Self = Self(2);

    /// Interpret a syscall register as a descriptor.
    ///
    /// Returns `None` if the value is outside the table.
    #[inline]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < MAX_OPEN_FILES {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Value handed back to user code.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }

    /// Check if this is one of the console slots.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::FIRST_USER.0
    }
}

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fd({})", self.0)
    }
}

/// What a descriptor slot refers to.
#[derive(Debug)]
pub enum OpenFile {
    /// Console input.
    Stdin,
    /// Console output.
    Stdout,
    /// A file store entry.
    File(FileHandle),
}

impl OpenFile {
    /// Transfer directions permitted through this slot.
    pub fn access(&self) -> Access {
        match self {
            Self::Stdin => Access::READ,
            Self::Stdout => Access::WRITE,
            Self::File(handle) => handle.access(),
        }
    }
}

/// Descriptor table of one process.
#[derive(Debug)]
pub struct HandleTable {
    slots: [Option<OpenFile>; MAX_OPEN_FILES],
}

impl HandleTable {
    /// Create a table with only the console streams open.
    pub fn new() -> Self {
        let mut slots: [Option<OpenFile>; MAX_OPEN_FILES] = Default::default();
        slots[Fd::STDIN.index()] = Some(OpenFile::Stdin);
        slots[Fd::STDOUT.index()] = Some(OpenFile::Stdout);
        Self { slots }
    }

    /// Install a handle in the lowest free non-reserved slot.
    ///
    /// # Returns
    /// * `Ok(Fd)` - The descriptor now owning `handle`
    /// * `Err(TableFull)` - Every slot is taken; `handle` is dropped
    pub fn allocate(&mut self, handle: FileHandle) -> SysResult<Fd> {
        let fd = self.find_free().ok_or(SyscallError::TableFull)?;
        self.slots[fd.index()] = Some(OpenFile::File(handle));
        Ok(fd)
    }

    /// Look up an open descriptor.
    pub fn resolve(&mut self, fd: Fd) -> SysResult<&mut OpenFile> {
        self.slots[fd.index()]
            .as_mut()
            .ok_or(SyscallError::InvalidDescriptor)
    }

    /// Close a descriptor and hand back its handle.
    ///
    /// Fails on the reserved slots and on empty slots.
    pub fn release(&mut self, fd: Fd) -> SysResult<FileHandle> {
        if fd.is_reserved() {
            return Err(SyscallError::InvalidDescriptor);
        }

        match self.slots[fd.index()].take() {
            Some(OpenFile::File(handle)) => Ok(handle),
            other => {
                self.slots[fd.index()] = other;
                Err(SyscallError::InvalidDescriptor)
            }
        }
    }

    /// Check whether `allocate` would succeed.
    pub fn has_free_slot(&self) -> bool {
        self.find_free().is_some()
    }

    /// Number of file store handles held, excluding the console streams.
    pub fn open_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Some(OpenFile::File(_))))
            .count()
    }

    /// Drop every open handle. Used on process termination.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    fn find_free(&self) -> Option<Fd> {
        (Fd::FIRST_USER.index()..MAX_OPEN_FILES)
            .find(|&i| self.slots[i].is_none())
            .map(|i| Fd(i as u8))
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
