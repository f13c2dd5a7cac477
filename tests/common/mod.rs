//! Test harness: runs user programs as Rust closures on host threads.
//!
//! Each process gets a [`PagedMemory`] laid out as:
//!
//! ```text
//!   page 0        untouched (null page)
//!   page 1        read-only, holds "ro.txt"
//!   pages 2..63   heap for strings and buffers
//!   page 63       unmapped guard page
//! ```

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use userprog::fs::BufferConsole;
use userprog::mm::{AddressSpace, PagedMemory, UserAddr, PAGE_SIZE};
use userprog::proc::{ExecutionEngine, Pid, ProgramImage, Scheduler, UserProcess};
use userprog::syscall::numbers::*;
use userprog::{dispatch, Completion, Kernel, KernelConfig, SysResult, SyscallError};

/// Pages in every user address space.
pub const PAGES: usize = 64;
/// Page mapped read-only; holds the string "ro.txt".
pub const READ_ONLY_PAGE: usize = 1;
/// Page left unmapped.
pub const GUARD_PAGE: usize = PAGES - 1;

pub const READ_ONLY_ADDR: i32 = (READ_ONLY_PAGE * PAGE_SIZE) as i32;
pub const GUARD_ADDR: i32 = (GUARD_PAGE * PAGE_SIZE) as i32;
/// Far outside every address space.
pub const UNMAPPED_ADDR: i32 = 0x0100_0000;

const HEAP_START: usize = (READ_ONLY_PAGE + 1) * PAGE_SIZE;
const HEAP_END: usize = GUARD_PAGE * PAGE_SIZE;

/// Status pre-filled into join's output slot to detect untouched writes.
pub const UNTOUCHED: i32 = 0x7F7F_7F7F;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Permit-based scheduler backed by a condition variable.
#[derive(Default)]
pub struct ThreadScheduler {
    permits: Mutex<HashSet<Pid>>,
    cond: Condvar,
}

impl Scheduler for ThreadScheduler {
    fn block(&self, pid: Pid) {
        let mut permits = self.permits.lock().unwrap();
        while !permits.remove(&pid) {
            permits = self.cond.wait(permits).unwrap();
        }
    }

    fn wake(&self, pid: Pid) {
        self.permits.lock().unwrap().insert(pid);
        self.cond.notify_all();
    }
}

pub type Program = Arc<dyn Fn(&mut UserCtx) -> i32 + Send + Sync>;

#[derive(Default)]
struct EngineState {
    programs: Mutex<HashMap<String, Program>>,
    running: Mutex<usize>,
    idle: Condvar,
    failures: Mutex<Vec<String>>,
}

/// Runs each process on its own thread.
#[derive(Default)]
pub struct ProgramEngine {
    state: Arc<EngineState>,
}

impl ProgramEngine {
    pub fn register(&self, name: &str, program: Program) {
        self.state
            .programs
            .lock()
            .unwrap()
            .insert(name.to_string(), program);
    }

    /// Wait until every started process has finished.
    pub fn wait_idle(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut running = self.state.running.lock().unwrap();
        while *running > 0 {
            let now = Instant::now();
            assert!(now < deadline, "{} user programs still running", *running);
            running = self.state.idle.wait_timeout(running, deadline - now).unwrap().0;
        }
    }

    pub fn failures(&self) -> Vec<String> {
        self.state.failures.lock().unwrap().clone()
    }
}

impl ExecutionEngine for ProgramEngine {
    fn load(&self, image: &ProgramImage) -> SysResult<Box<dyn AddressSpace>> {
        if !self
            .state
            .programs
            .lock()
            .unwrap()
            .contains_key(image.name.as_str())
        {
            return Err(SyscallError::NotFound);
        }

        let mut memory = PagedMemory::new(PAGES);
        memory.load(UserAddr::new(READ_ONLY_ADDR as usize), b"ro.txt\0")?;
        memory.protect(READ_ONLY_PAGE);
        memory.unmap(GUARD_PAGE);
        Ok(Box::new(memory))
    }

    fn start(&self, kernel: Arc<Kernel>, mut process: UserProcess, image: ProgramImage) {
        let program = self
            .state
            .programs
            .lock()
            .unwrap()
            .get(image.name.as_str())
            .cloned();
        let Some(program) = program else {
            kernel.exit(&mut process, -1);
            return;
        };

        *self.state.running.lock().unwrap() += 1;
        let state = Arc::clone(&self.state);

        thread::spawn(move || {
            let mut ctx = UserCtx {
                kernel,
                process,
                args: image.args,
                next: HEAP_START,
            };

            match panic::catch_unwind(AssertUnwindSafe(|| program(&mut ctx))) {
                Ok(status) => {
                    if !ctx.process.is_terminated() {
                        ctx.kernel.exit(&mut ctx.process, status);
                    }
                }
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<String>()
                        .cloned()
                        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                        .unwrap_or_default();
                    state
                        .failures
                        .lock()
                        .unwrap()
                        .push(format!("{}: {}", image.name, message));
                    ctx.crash();
                }
            }

            *state.running.lock().unwrap() -= 1;
            state.idle.notify_all();
        });
    }
}

/// What a user program sees: its own memory and a syscall instruction.
pub struct UserCtx {
    kernel: Arc<Kernel>,
    process: UserProcess,
    args: Vec<Vec<u8>>,
    next: usize,
}

impl UserCtx {
    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }

    /// Issue a syscall and return the raw completion.
    pub fn call(&mut self, number: usize, args: [i32; 4]) -> Completion {
        dispatch(&self.kernel, &mut self.process, number, args)
    }

    /// Issue a syscall that is expected to return to the caller.
    pub fn syscall(&mut self, number: usize, args: [i32; 4]) -> i32 {
        match self.call(number, args) {
            Completion::Return(value) => value,
            other => panic!("syscall {} did not return: {:?}", number, other),
        }
    }

    fn reserve(&mut self, len: usize) -> usize {
        assert!(len <= HEAP_END - HEAP_START, "allocation too large");
        if self.next + len > HEAP_END {
            self.next = HEAP_START;
        }
        let addr = self.next;
        self.next += len;
        addr
    }

    /// Copy bytes into fresh user memory and return their address.
    pub fn put_bytes(&mut self, data: &[u8]) -> i32 {
        let addr = self.reserve(data.len().max(1));
        self.process
            .memory_mut()
            .write_bytes(UserAddr::new(addr), data)
            .unwrap();
        addr as i32
    }

    /// Write bytes at a fixed user address.
    pub fn poke(&mut self, addr: i32, data: &[u8]) {
        self.process
            .memory_mut()
            .write_bytes(UserAddr::new(addr as usize), data)
            .unwrap();
    }

    /// Copy a NUL-terminated string into user memory.
    pub fn put_str(&mut self, s: &str) -> i32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.put_bytes(&bytes)
    }

    /// Reserve zeroed user memory.
    pub fn alloc(&mut self, len: usize) -> i32 {
        self.put_bytes(&vec![0; len])
    }

    /// Build an argv array of string pointers.
    pub fn put_argv(&mut self, args: &[&str]) -> i32 {
        let mut table = Vec::with_capacity(args.len() * 4);
        for arg in args {
            let ptr = self.put_str(arg) as u32;
            table.extend_from_slice(&ptr.to_le_bytes());
        }
        self.put_bytes(&table)
    }

    pub fn peek(&self, addr: i32, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.process
            .memory()
            .read_bytes(UserAddr::new(addr as usize), &mut buf)
            .unwrap();
        buf
    }

    pub fn creat(&mut self, name: &str) -> i32 {
        let ptr = self.put_str(name);
        self.syscall(SYS_CREAT, [ptr, 0, 0, 0])
    }

    pub fn open(&mut self, name: &str) -> i32 {
        let ptr = self.put_str(name);
        self.syscall(SYS_OPEN, [ptr, 0, 0, 0])
    }

    pub fn unlink(&mut self, name: &str) -> i32 {
        let ptr = self.put_str(name);
        self.syscall(SYS_UNLINK, [ptr, 0, 0, 0])
    }

    pub fn close(&mut self, fd: i32) -> i32 {
        self.syscall(SYS_CLOSE, [fd, 0, 0, 0])
    }

    pub fn write(&mut self, fd: i32, data: &[u8]) -> i32 {
        let buf = self.put_bytes(data);
        self.syscall(SYS_WRITE, [fd, buf, data.len() as i32, 0])
    }

    /// Read up to `len` bytes; returns the result and the bytes received.
    pub fn read(&mut self, fd: i32, len: usize) -> (i32, Vec<u8>) {
        let buf = self.alloc(len);
        let n = self.syscall(SYS_READ, [fd, buf, len as i32, 0]);
        let data = if n > 0 {
            self.peek(buf, n as usize)
        } else {
            Vec::new()
        };
        (n, data)
    }

    pub fn exec(&mut self, name: &str, args: &[&str]) -> i32 {
        let name = self.put_str(name);
        let argv = if args.is_empty() {
            0
        } else {
            self.put_argv(args)
        };
        self.syscall(SYS_EXEC, [name, args.len() as i32, argv, 0])
    }

    /// Join a child; returns the result and whatever is in the status slot.
    pub fn join(&mut self, pid: i32) -> (i32, i32) {
        let status = self.put_bytes(&UNTOUCHED.to_le_bytes());
        let ret = self.syscall(SYS_JOIN, [pid, status, 0, 0]);
        let word = self.peek(status, 4);
        (ret, i32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    pub fn halt(&mut self) -> Completion {
        self.call(SYS_HALT, [0; 4])
    }

    pub fn exit(&mut self, status: i32) -> Completion {
        self.call(SYS_EXIT, [status, 0, 0, 0])
    }

    /// Touch unmapped memory from program code, like a wild dereference.
    pub fn crash(&mut self) {
        let fault = self
            .process
            .memory()
            .read_u32(UserAddr::new(UNMAPPED_ADDR as usize))
            .unwrap_err();
        self.kernel.abort(&mut self.process, fault);
    }
}

/// A kernel wired to a [`ProgramEngine`], a [`ThreadScheduler`] and a
/// [`BufferConsole`].
pub struct Harness {
    pub kernel: Arc<Kernel>,
    pub engine: Arc<ProgramEngine>,
    pub console: Arc<BufferConsole>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::new())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        init_logging();
        let engine = Arc::new(ProgramEngine::default());
        let console = Arc::new(BufferConsole::new());
        let kernel = Kernel::new(
            config,
            console.clone(),
            engine.clone(),
            Arc::new(ThreadScheduler::default()),
        );
        Self {
            kernel,
            engine,
            console,
        }
    }

    pub fn program<F>(&self, name: &str, program: F)
    where
        F: Fn(&mut UserCtx) -> i32 + Send + Sync + 'static,
    {
        self.engine.register(name, Arc::new(program));
    }

    /// Boot `name` as root and wait for every process to finish.
    pub fn run(&self, name: &str) -> Pid {
        self.run_with_args(name, &[])
    }

    pub fn run_with_args(&self, name: &str, args: &[&str]) -> Pid {
        let pid = self.kernel.boot(name, args).unwrap();
        self.engine.wait_idle();
        let failures = self.engine.failures();
        assert!(failures.is_empty(), "user program failures: {:?}", failures);
        pid
    }
}
