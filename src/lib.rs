//! PantherOS user-program syscall layer
//!
//! The part of the kernel that user programs talk to: descriptor tables,
//! the shared file store, process creation and join, exit and halt.
//!
//! # Architecture
//! - [`syscall::dispatch`] validates raw registers and routes each call
//! - [`Kernel`] owns the shared [`fs::FileStore`] and [`proc::ProcessTable`]
//! - Each [`proc::UserProcess`] owns its [`fs::HandleTable`] and address
//!   space
//! - Running user code is left to an [`proc::ExecutionEngine`]; blocking
//!   is left to a [`proc::Scheduler`]
//!
//! # Security Features
//! - Every user pointer goes through an [`mm::AddressSpace`]
//! - Every failure surfaces as -1, never as a fault in the caller
//! - Only direct parents can join, and only once
//! - Only the root process can halt

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod proc;
pub mod syscall;

pub use config::KernelConfig;
pub use error::{SysResult, SyscallError};
pub use kernel::Kernel;
pub use syscall::{dispatch, Completion};
