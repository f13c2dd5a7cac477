//! File Store
//!
//! Process-wide registry mapping names to reference-counted file entries.
//!
//! # Design
//! - Entries live in an arena of generation-checked slots
//! - The name index only holds entries that are still linked
//! - An unlinked entry survives until its last handle is released
//!
//! # Concurrency
//! - The arena and name index share one lock
//! - File contents have their own lock, so transfers on different files
//!   never contend
//! - Lock order is arena, then contents; handles never take the arena
//!   lock while holding contents

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, warn};
use spin::Mutex;

use super::handle::{Access, FileHandle};
use super::name::FileName;
use crate::error::{SysResult, SyscallError};
use crate::proc::Pid;

/// Generation-checked reference to a file store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    index: u32,
    generation: u32,
}

impl FileId {
    /// Arena slot index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Contents of a file, shared by every handle open on it.
#[derive(Debug, Default)]
pub(crate) struct FileData {
    contents: Mutex<Vec<u8>>,
}

impl FileData {
    /// Copy bytes starting at `offset` into `buf`. Returns the count copied.
    pub(crate) fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let contents = self.contents.lock();
        if offset >= contents.len() {
            return 0;
        }
        let n = buf.len().min(contents.len() - offset);
        buf[..n].copy_from_slice(&contents[offset..offset + n]);
        n
    }

    /// Write `data` at `offset`, growing the file as needed.
    pub(crate) fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let mut contents = self.contents.lock();
        let end = offset + data.len();
        if end > contents.len() {
            contents.resize(end, 0);
        }
        contents[offset..end].copy_from_slice(data);
        data.len()
    }

    pub(crate) fn truncate(&self) {
        self.contents.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.contents.lock().len()
    }
}

/// A live entry in the arena.
struct Entry {
    name: FileName,
    data: Arc<FileData>,
    open_count: u32,
    unlinked: bool,
}

/// One arena slot. The generation is bumped each time the slot is freed.
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Slots {
    arena: Vec<Slot>,
    free: Vec<u32>,
    names: BTreeMap<FileName, u32>,
    live: usize,
}

impl Slots {
    fn entry_mut(&mut self, id: FileId) -> Option<&mut Entry> {
        self.arena
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn insert(&mut self, entry: Entry) -> FileId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.arena[index as usize];
            slot.entry = Some(entry);
            return FileId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.arena.len() as u32;
        self.arena.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        FileId {
            index,
            generation: 0,
        }
    }

    fn free(&mut self, index: u32) {
        let slot = &mut self.arena[index as usize];
        if slot.entry.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
            self.live -= 1;
        }
    }

    fn lookup(&self, name: &FileName) -> Option<(u32, &Entry)> {
        let index = *self.names.get(name)?;
        self.arena[index as usize]
            .entry
            .as_ref()
            .map(|entry| (index, entry))
    }
}

/// Size and reference count of a linked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Length of the contents in bytes.
    pub size: usize,
    /// Number of handles currently open on the file.
    pub open_count: u32,
}

/// The process-wide file store.
pub struct FileStore {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl FileStore {
    /// Create an empty store holding at most `capacity` entries, counting
    /// unlinked entries that are still open.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                arena: Vec::new(),
                free: Vec::new(),
                names: BTreeMap::new(),
                live: 0,
            }),
            capacity,
        }
    }

    /// Create `name`, or truncate it if it already exists, and open it.
    ///
    /// # Returns
    /// * `Ok(FileHandle)` - Read-write handle at offset 0
    /// * `Err(TableFull)` - The store is at capacity
    pub fn create(self: &Arc<Self>, name: &FileName, owner: Pid) -> SysResult<FileHandle> {
        let mut slots = self.slots.lock();

        if let Some(index) = slots.names.get(name).copied() {
            let slot = &mut slots.arena[index as usize];
            let generation = slot.generation;
            if let Some(entry) = slot.entry.as_mut() {
                entry.data.truncate();
                entry.open_count += 1;
                debug!("[FS] truncated {} (open_count={})", name, entry.open_count);
                let id = FileId { index, generation };
                return Ok(FileHandle::new(
                    Arc::clone(self),
                    id,
                    Arc::clone(&entry.data),
                    Access::READ | Access::WRITE,
                    owner,
                ));
            }
        }

        if slots.live >= self.capacity {
            warn!("[FS] store full, cannot create {}", name);
            return Err(SyscallError::TableFull);
        }

        let data = Arc::new(FileData::default());
        let id = slots.insert(Entry {
            name: name.clone(),
            data: Arc::clone(&data),
            open_count: 1,
            unlinked: false,
        });
        slots.names.insert(name.clone(), id.index);
        debug!("[FS] created {} as {:?}", name, id);

        Ok(FileHandle::new(
            Arc::clone(self),
            id,
            data,
            Access::READ | Access::WRITE,
            owner,
        ))
    }

    /// Open an existing file with a fresh offset.
    ///
    /// # Returns
    /// * `Ok(FileHandle)` - Read-write handle at offset 0
    /// * `Err(NotFound)` - No linked file has this name
    pub fn open(self: &Arc<Self>, name: &FileName, owner: Pid) -> SysResult<FileHandle> {
        let mut slots = self.slots.lock();

        let index = slots
            .names
            .get(name)
            .copied()
            .ok_or(SyscallError::NotFound)?;

        let slot = &mut slots.arena[index as usize];
        let id = FileId {
            index,
            generation: slot.generation,
        };
        let entry = slot.entry.as_mut().ok_or(SyscallError::NotFound)?;
        entry.open_count += 1;

        Ok(FileHandle::new(
            Arc::clone(self),
            id,
            Arc::clone(&entry.data),
            Access::READ | Access::WRITE,
            owner,
        ))
    }

    /// Remove `name` from the store.
    ///
    /// An entry with open handles is only hidden; it is freed when the
    /// last handle is released.
    pub fn unlink(&self, name: &FileName) -> SysResult<()> {
        let mut slots = self.slots.lock();

        let index = slots.names.remove(name).ok_or(SyscallError::NotFound)?;

        let pending = match slots.arena[index as usize].entry.as_mut() {
            Some(entry) if entry.open_count > 0 => {
                entry.unlinked = true;
                true
            }
            _ => false,
        };

        if pending {
            debug!("[FS] {} unlinked, deletion pending", name);
        } else {
            slots.free(index);
            debug!("[FS] {} unlinked and freed", name);
        }

        Ok(())
    }

    /// Drop one reference to `id`. Called exactly once per handle.
    pub(crate) fn release(&self, id: FileId) {
        let mut slots = self.slots.lock();

        let Some(entry) = slots.entry_mut(id) else {
            warn!("[FS] release of stale {:?}", id);
            return;
        };

        if entry.open_count == 0 {
            warn!("[FS] release of {} with no open handles", entry.name);
            return;
        }

        entry.open_count -= 1;
        if entry.open_count == 0 && entry.unlinked {
            debug!("[FS] last handle on unlinked {} closed, freeing", entry.name);
            slots.free(id.index);
        }
    }

    /// Check whether a linked file named `name` exists.
    pub fn exists(&self, name: &FileName) -> bool {
        self.slots.lock().names.contains_key(name)
    }

    /// Size and open count of a linked file.
    pub fn stat(&self, name: &FileName) -> Option<FileStat> {
        let slots = self.slots.lock();
        slots.lookup(name).map(|(_, entry)| FileStat {
            size: entry.data.len(),
            open_count: entry.open_count,
        })
    }

    /// Number of entries held, including unlinked entries still open.
    pub fn len(&self) -> usize {
        self.slots.lock().live
    }

    /// Check whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
