//! User memory access for the syscall layer
//!
//! Provides:
//! - Type-safe user addresses
//! - The address-space translator interface
//! - A paged reference implementation
//!
//! # Security Principles
//! - User pointers are only dereferenced through the translator
//! - Every access is bounds-checked page by page
//! - Faults are reported, never raised as panics

mod address;
mod paging;
mod space;

pub use address::{UserAddr, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
pub use paging::{PageFlags, PagedMemory};
pub use space::{AccessKind, AddressSpace, Fault, FaultKind};
