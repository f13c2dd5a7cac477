//! Open file handles
//!
//! A [`FileHandle`] is a private cursor over a file store entry. Each
//! successful `creat` or `open` makes a new one; handles are never shared
//! between descriptors.
//!
//! # Security Properties
//! - Dropping a handle releases its store reference exactly once
//! - A handle keeps its entry's contents alive after unlink

use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

use super::store::{FileData, FileId, FileStore};
use crate::proc::Pid;

bitflags! {
    /// Transfer directions permitted on an open file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        /// Bytes may be read.
        const READ = 1 << 0;
        /// Bytes may be written.
        const WRITE = 1 << 1;
    }
}

/// A cursor over one file store entry.
pub struct FileHandle {
    store: Arc<FileStore>,
    id: FileId,
    data: Arc<FileData>,
    offset: usize,
    access: Access,
    owner: Pid,
}

impl FileHandle {
    pub(crate) fn new(
        store: Arc<FileStore>,
        id: FileId,
        data: Arc<FileData>,
        access: Access,
        owner: Pid,
    ) -> Self {
        Self {
            store,
            id,
            data,
            offset: 0,
            access,
            owner,
        }
    }

    /// Read up to `buf.len()` bytes at the current offset.
    ///
    /// Returns the number of bytes copied; 0 at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.data.read_at(self.offset, buf);
        self.offset += n;
        n
    }

    /// Write `data` at the current offset, extending the file as needed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = self.data.write_at(self.offset, data);
        self.offset += n;
        n
    }

    /// Move the cursor to an absolute position.
    #[cfg(test)]
    pub(crate) fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Process that opened this handle.
    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("access", &self.access)
            .field("owner", &self.owner)
            .finish()
    }
}
