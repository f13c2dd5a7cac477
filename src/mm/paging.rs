//! Paged User Memory
//!
//! A single-level page table over fixed-size pages. This is the reference
//! [`AddressSpace`] used by loaders that build user images in kernel
//! memory, and by the test harness.
//!
//! # Page Table Structure
//! - One entry per virtual page, indexed by virtual page number
//! - Each entry owns its page frame and a set of [`PageFlags`]
//!
//! # Security Properties
//! - Invalid pages fault on every access
//! - Read-only pages fault on user-directed writes
//! - Accesses never touch a neighbouring page unless it is also valid

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitflags::bitflags;

use super::address::{UserAddr, PAGE_SIZE};
use super::space::{AccessKind, AddressSpace, Fault, FaultKind};

bitflags! {
    /// Page table entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// Entry maps a frame.
        const VALID = 1 << 0;
        /// Frame may not be written through this entry.
        const READ_ONLY = 1 << 1;
        /// Set on every access.
        const USED = 1 << 2;
        /// Set on every write.
        const DIRTY = 1 << 3;
    }
}

/// A page table entry together with the frame it maps.
#[derive(Clone)]
struct PageEntry {
    flags: PageFlags,
    frame: Box<[u8; PAGE_SIZE]>,
}

impl PageEntry {
    fn new() -> Self {
        Self {
            flags: PageFlags::VALID,
            frame: Box::new([0; PAGE_SIZE]),
        }
    }
}

/// A user address space made of `page_count` contiguous virtual pages
/// starting at address 0.
#[derive(Clone)]
pub struct PagedMemory {
    pages: Vec<PageEntry>,
}

impl PagedMemory {
    /// Create an address space with every page valid and writable.
    pub fn new(page_count: usize) -> Self {
        let pages = (0..page_count).map(|_| PageEntry::new()).collect();
        Self { pages }
    }

    /// Number of virtual pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Get the flags of a page, or `None` if it is outside the table.
    pub fn flags(&self, vpn: usize) -> Option<PageFlags> {
        self.pages.get(vpn).map(|page| page.flags)
    }

    /// Mark a page read-only.
    pub fn protect(&mut self, vpn: usize) {
        if let Some(page) = self.pages.get_mut(vpn) {
            page.flags.insert(PageFlags::READ_ONLY);
        }
    }

    /// Invalidate a page; every later access to it faults.
    pub fn unmap(&mut self, vpn: usize) {
        if let Some(page) = self.pages.get_mut(vpn) {
            page.flags.remove(PageFlags::VALID);
        }
    }

    /// Copy bytes into memory with loader privileges.
    ///
    /// Ignores [`PageFlags::READ_ONLY`], so a loader can populate text and
    /// read-only data. Still faults on invalid pages.
    pub fn load(&mut self, addr: UserAddr, data: &[u8]) -> Result<(), Fault> {
        self.check(addr, data.len(), false)?;
        self.copy_in(addr, data);
        Ok(())
    }

    /// Walk the entries covering `[addr, addr + len)`.
    fn check(&self, addr: UserAddr, len: usize, write: bool) -> Result<(), Fault> {
        if len == 0 {
            return Ok(());
        }

        let last = addr
            .checked_add(len - 1)
            .ok_or(Fault::new(addr, FaultKind::Overflow))?;

        for vpn in addr.page_number()..=last.page_number() {
            let fault_addr = if vpn == addr.page_number() {
                addr
            } else {
                UserAddr::new(vpn * PAGE_SIZE)
            };

            let page = self
                .pages
                .get(vpn)
                .filter(|page| page.flags.contains(PageFlags::VALID))
                .ok_or(Fault::new(fault_addr, FaultKind::Unmapped))?;

            if write && page.flags.contains(PageFlags::READ_ONLY) {
                return Err(Fault::new(fault_addr, FaultKind::ReadOnly));
            }
        }

        Ok(())
    }

    /// Copy into already-checked memory.
    fn copy_in(&mut self, addr: UserAddr, mut data: &[u8]) {
        let mut cursor = addr.as_usize();
        while !data.is_empty() {
            let vpn = cursor / PAGE_SIZE;
            let offset = cursor % PAGE_SIZE;
            let chunk = data.len().min(PAGE_SIZE - offset);

            let page = &mut self.pages[vpn];
            page.frame[offset..offset + chunk].copy_from_slice(&data[..chunk]);
            page.flags.insert(PageFlags::USED | PageFlags::DIRTY);

            data = &data[chunk..];
            cursor += chunk;
        }
    }
}

impl AddressSpace for PagedMemory {
    fn check_range(&self, addr: UserAddr, len: usize, access: AccessKind) -> Result<(), Fault> {
        self.check(addr, len, access == AccessKind::Write)
    }

    fn read_bytes(&self, addr: UserAddr, buf: &mut [u8]) -> Result<(), Fault> {
        self.check(addr, buf.len(), false)?;

        let mut cursor = addr.as_usize();
        let mut buf = buf;
        while !buf.is_empty() {
            let vpn = cursor / PAGE_SIZE;
            let offset = cursor % PAGE_SIZE;
            let chunk = buf.len().min(PAGE_SIZE - offset);

            let (dst, rest) = buf.split_at_mut(chunk);
            dst.copy_from_slice(&self.pages[vpn].frame[offset..offset + chunk]);

            buf = rest;
            cursor += chunk;
        }

        Ok(())
    }

    fn write_bytes(&mut self, addr: UserAddr, data: &[u8]) -> Result<(), Fault> {
        self.check(addr, data.len(), true)?;
        self.copy_in(addr, data);
        Ok(())
    }
}
