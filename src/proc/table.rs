//! Process Table
//!
//! Process-wide registry of running processes and of terminated children
//! that have not been joined yet.
//!
//! # Lifecycle
//! ```text
//!   register ──► Running ──terminate──► Zombie ──join──► (removed)
//!                   │
//!                   └──terminate, no parent──► (removed)
//! ```
//!
//! # Security Properties
//! - Only a direct parent can observe or reap a child
//! - A zombie is reaped at most once
//! - The only registered waiter on a pid is its parent

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt;

use log::{debug, info};
use spin::Mutex;

use crate::error::{SysResult, SyscallError};

/// A process identifier. Always positive.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Largest pid handed out; pids must fit in a syscall return register.
    pub const MAX: u32 = i32::MAX as u32;

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Interpret a syscall register as a pid.
    #[inline]
    pub const fn from_register(raw: i32) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw as u32))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Called `exit` or returned from its entry point.
    Exited(i32),
    /// Killed by an unrecoverable fault.
    Killed,
}

/// Externally visible state of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie(Termination),
}

/// Result of a non-blocking join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPoll {
    /// The child was reaped.
    Ready(Termination),
    /// The child is still running; the caller is registered as its waiter.
    Pending,
}

/// Side effects of a termination the caller must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminateOutcome {
    /// Parent blocked in `join` on the terminated process.
    pub waiter: Option<Pid>,
    /// No process is running any more.
    pub last: bool,
}

#[derive(Debug)]
struct ProcessRecord {
    parent: Option<Pid>,
    state: ProcessState,
    children: BTreeSet<Pid>,
    /// Child most recently joined by this process.
    last_reaped: Option<Pid>,
    waiter: Option<Pid>,
}

struct Inner {
    records: BTreeMap<Pid, ProcessRecord>,
    next_pid: u32,
    root: Option<Pid>,
    shutdown: bool,
}

impl Inner {
    fn allocate_pid(&mut self) -> Pid {
        loop {
            let candidate = Pid(self.next_pid);
            self.next_pid = if self.next_pid >= Pid::MAX {
                1
            } else {
                self.next_pid + 1
            };
            if !self.records.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// The process-wide process table.
pub struct ProcessTable {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ProcessTable {
    /// Create an empty table holding at most `capacity` processes,
    /// running or zombie.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: BTreeMap::new(),
                next_pid: 1,
                root: None,
                shutdown: false,
            }),
            capacity,
        }
    }

    /// Register a new running process.
    ///
    /// The first process registered without a parent becomes the root.
    ///
    /// # Returns
    /// * `Ok(Pid)` - The new process id
    /// * `Err(TableFull)` - The table is at capacity
    /// * `Err(ShuttingDown)` - The kernel has halted
    /// * `Err(NotFound)` - `parent` is not a running process
    pub fn register(&self, parent: Option<Pid>) -> SysResult<Pid> {
        let mut inner = self.inner.lock();

        if inner.shutdown {
            return Err(SyscallError::ShuttingDown);
        }
        if inner.records.len() >= self.capacity {
            return Err(SyscallError::TableFull);
        }
        if let Some(parent) = parent {
            match inner.records.get(&parent) {
                Some(record) if record.state == ProcessState::Running => {}
                _ => return Err(SyscallError::NotFound),
            }
        }

        let pid = inner.allocate_pid();
        inner.records.insert(
            pid,
            ProcessRecord {
                parent,
                state: ProcessState::Running,
                children: BTreeSet::new(),
                last_reaped: None,
                waiter: None,
            },
        );

        match parent {
            Some(parent) => {
                if let Some(record) = inner.records.get_mut(&parent) {
                    record.children.insert(pid);
                }
            }
            None if inner.root.is_none() => inner.root = Some(pid),
            None => {}
        }

        debug!("[PROCESS] registered {} (parent={:?})", pid, parent);
        Ok(pid)
    }

    /// Record the termination of a running process.
    ///
    /// Running children are orphaned and zombie children are discarded.
    /// The process itself becomes a zombie if it still has a parent and is
    /// removed otherwise.
    ///
    /// Returns `None` if `pid` is not running.
    pub fn terminate(&self, pid: Pid, how: Termination) -> Option<TerminateOutcome> {
        let mut inner = self.inner.lock();

        let record = inner.records.get_mut(&pid)?;
        if record.state != ProcessState::Running {
            return None;
        }

        let children = core::mem::take(&mut record.children);
        let parent = record.parent;
        let waiter = record.waiter.take();

        if parent.is_some() {
            record.state = ProcessState::Zombie(how);
            record.last_reaped = None;
        } else {
            inner.records.remove(&pid);
        }

        for child in children {
            let zombie = match inner.records.get_mut(&child) {
                Some(record) if record.state == ProcessState::Running => {
                    record.parent = None;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if zombie {
                inner.records.remove(&child);
            }
        }

        if inner.root == Some(pid) {
            inner.root = None;
        }

        let last = !inner
            .records
            .values()
            .any(|record| record.state == ProcessState::Running);

        info!("[PROCESS] {} terminated: {:?}", pid, how);
        Some(TerminateOutcome { waiter, last })
    }

    /// Try to reap `child` on behalf of `caller`.
    ///
    /// # Returns
    /// * `Ok(Ready)` - The child was a zombie and is now gone
    /// * `Ok(Pending)` - The child is running; `caller` is its waiter
    /// * `Err(AlreadyReaped)` - `caller` joined this child on its last join
    /// * `Err(PermissionDenied)` - `child` exists but is not caller's child
    /// * `Err(NotFound)` - No such process, including children reaped
    ///   before the most recent one
    /// * `Err(ShuttingDown)` - The kernel has halted
    pub fn poll_join(&self, caller: Pid, child: Pid) -> SysResult<JoinPoll> {
        let mut inner = self.inner.lock();

        if inner.shutdown {
            return Err(SyscallError::ShuttingDown);
        }

        let record = inner.records.get(&caller).ok_or(SyscallError::NotFound)?;
        if !record.children.contains(&child) {
            return Err(if inner.records.contains_key(&child) {
                SyscallError::PermissionDenied
            } else if record.last_reaped == Some(child) {
                SyscallError::AlreadyReaped
            } else {
                SyscallError::NotFound
            });
        }

        let child_record = inner
            .records
            .get_mut(&child)
            .ok_or(SyscallError::NotFound)?;

        match child_record.state {
            ProcessState::Running => {
                child_record.waiter = Some(caller);
                Ok(JoinPoll::Pending)
            }
            ProcessState::Zombie(how) => {
                inner.records.remove(&child);
                if let Some(record) = inner.records.get_mut(&caller) {
                    record.children.remove(&child);
                    record.last_reaped = Some(child);
                }
                info!("[PROCESS] {} reaped {}", caller, child);
                Ok(JoinPoll::Ready(how))
            }
        }
    }

    /// Mark the table shut down and return every blocked joiner.
    pub fn shutdown(&self) -> Vec<Pid> {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner
            .records
            .values_mut()
            .filter_map(|record| record.waiter.take())
            .collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Check whether `pid` is the root process.
    pub fn is_root(&self, pid: Pid) -> bool {
        self.inner.lock().root == Some(pid)
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.inner.lock().records.get(&pid).map(|record| record.state)
    }

    /// Parent of `pid`, if it has one.
    pub fn parent(&self, pid: Pid) -> Option<Pid> {
        self.inner.lock().records.get(&pid).and_then(|record| record.parent)
    }

    /// Number of registered processes, running or zombie.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
