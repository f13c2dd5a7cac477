//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses that come from user registers, so a
//! raw syscall argument cannot be used as a pointer without first being
//! checked by the address-space translator.
//!
//! # Security Properties
//! - User addresses are never dereferenced directly
//! - Negative register values never become addresses
//! - Address arithmetic is overflow-checked

use core::fmt;

/// Page size of a user address space (1 KiB).
pub const PAGE_SIZE: usize = 1024;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 10;

/// A virtual address inside a user process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UserAddr(usize);

impl UserAddr {
    /// The null user pointer.
    pub const NULL: Self = Self(0);

    /// Create a user address from a raw value.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Interpret a syscall register as a user address.
    ///
    /// Returns `None` for negative register values; they can never name
    /// user memory.
    #[inline]
    pub const fn from_register(raw: i32) -> Option<Self> {
        if raw < 0 {
            None
        } else {
            Some(Self(raw as usize))
        }
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this is the null pointer.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Get the virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Get the offset within the page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl fmt::Debug for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddr({:#010x})", self.0)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
