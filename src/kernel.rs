//! Kernel state shared by every process
//!
//! Owns the file store and the process table, and the collaborators that
//! run and suspend user code. Every syscall that affects more than the
//! caller's own descriptor table goes through here.
//!
//! # Security Considerations
//! - Only the root process may halt the machine
//! - A process is torn down exactly once, whatever the cause
//! - Halting wakes every blocked joiner; nothing stays parked forever

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{info, warn};

use crate::config::KernelConfig;
use crate::error::{SysResult, SyscallError};
use crate::fs::{Console, FileName, FileStore};
use crate::mm::Fault;
use crate::proc::{
    ExecutionEngine, JoinPoll, Pid, ProcessTable, ProgramImage, Scheduler, Termination,
    UserProcess,
};

/// The syscall layer's shared state.
pub struct Kernel {
    config: KernelConfig,
    files: Arc<FileStore>,
    processes: ProcessTable,
    console: Arc<dyn Console>,
    engine: Arc<dyn ExecutionEngine>,
    scheduler: Arc<dyn Scheduler>,
}

impl Kernel {
    /// Create a kernel with empty tables.
    pub fn new(
        config: KernelConfig,
        console: Arc<dyn Console>,
        engine: Arc<dyn ExecutionEngine>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            files: Arc::new(FileStore::new(config.max_files)),
            processes: ProcessTable::new(config.max_processes),
            console,
            engine,
            scheduler,
        })
    }

    /// Start the root process.
    ///
    /// # Arguments
    /// * `program` - Name of the executable
    /// * `args` - Argument strings handed to the program
    ///
    /// # Returns
    /// * `Ok(Pid)` - Pid of the root process
    /// * `Err(InvalidName)` - `program` is not a valid file name
    /// * `Err(NotFound)` - The engine could not load the program
    pub fn boot(self: &Arc<Self>, program: &str, args: &[&str]) -> SysResult<Pid> {
        let image = ProgramImage {
            name: FileName::try_from(program)?,
            args: args.iter().map(|arg| arg.as_bytes().to_vec()).collect::<Vec<_>>(),
        };

        info!("[KERNEL] booting {}", image.name);
        self.spawn(None, image)
    }

    /// Load `image` and start it as a child of `parent`.
    ///
    /// The image is loaded before a pid is allocated, so a failed load
    /// leaves the process table untouched.
    pub fn spawn(self: &Arc<Self>, parent: Option<Pid>, image: ProgramImage) -> SysResult<Pid> {
        if self.is_halted() {
            return Err(SyscallError::ShuttingDown);
        }

        let memory = self.engine.load(&image)?;
        let pid = self.processes.register(parent)?;

        info!(
            "[PROCESS] spawned {} as {} (parent={:?}, argc={})",
            image.name,
            pid,
            parent,
            image.args.len()
        );

        let process = UserProcess::new(pid, memory);
        self.engine.start(Arc::clone(self), process, image);
        Ok(pid)
    }

    /// Wait for `child` to terminate and reap it.
    ///
    /// Blocks `caller` through the scheduler while the child is running.
    pub fn join(&self, caller: Pid, child: Pid) -> SysResult<Termination> {
        loop {
            match self.processes.poll_join(caller, child)? {
                JoinPoll::Ready(how) => return Ok(how),
                JoinPoll::Pending => self.scheduler.block(caller),
            }
        }
    }

    /// Terminate `process` normally with `status`.
    pub fn exit(&self, process: &mut UserProcess, status: i32) {
        self.terminate(process, Termination::Exited(status));
    }

    /// Kill `process` after an unrecoverable fault in its own execution.
    pub fn abort(&self, process: &mut UserProcess, fault: Fault) {
        warn!("[EXCEPTION] process {} killed: {}", process.pid, fault);
        self.terminate(process, Termination::Killed);
    }

    fn terminate(&self, process: &mut UserProcess, how: Termination) {
        if process.terminated {
            return;
        }
        process.terminated = true;
        process.files.clear();

        let Some(outcome) = self.processes.terminate(process.pid, how) else {
            return;
        };

        if let Some(waiter) = outcome.waiter {
            self.scheduler.wake(waiter);
        }

        if outcome.last && !self.is_halted() {
            info!("[KERNEL] last process exited, shutting down");
            self.shutdown();
        }
    }

    /// Shut the machine down on behalf of `caller`.
    ///
    /// # Returns
    /// * `Ok(())` - The kernel is halted
    /// * `Err(PermissionDenied)` - `caller` is not the root process
    pub fn halt(&self, caller: Pid) -> SysResult<()> {
        if !self.processes.is_root(caller) {
            warn!("[KERNEL] halt denied for non-root process {}", caller);
            return Err(SyscallError::PermissionDenied);
        }

        info!("[KERNEL] halt requested by {}", caller);
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        for waiter in self.processes.shutdown() {
            self.scheduler.wake(waiter);
        }
    }

    /// Check whether the kernel has shut down.
    pub fn is_halted(&self) -> bool {
        self.processes.is_shutdown()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn files(&self) -> &Arc<FileStore> {
        &self.files
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn console(&self) -> &dyn Console {
        &*self.console
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::BufferConsole;
    use crate::mm::{AddressSpace, PagedMemory};
    use crate::proc::ProcessState;
    use alloc::boxed::Box;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Engine that parks started processes for the test to drive by hand.
    #[derive(Default)]
    struct ParkingEngine {
        parked: StdMutex<HashMap<Pid, UserProcess>>,
    }

    impl ParkingEngine {
        fn take(&self, pid: Pid) -> UserProcess {
            self.parked.lock().unwrap().remove(&pid).unwrap()
        }
    }

    impl ExecutionEngine for ParkingEngine {
        fn load(&self, image: &ProgramImage) -> SysResult<Box<dyn AddressSpace>> {
            if image.name.as_str() == "missing" {
                return Err(SyscallError::NotFound);
            }
            Ok(Box::new(PagedMemory::new(2)))
        }

        fn start(&self, _kernel: Arc<Kernel>, process: UserProcess, _image: ProgramImage) {
            self.parked.lock().unwrap().insert(process.pid(), process);
        }
    }

    /// Scheduler that records wakeups and never blocks.
    #[derive(Default)]
    struct RecordingScheduler {
        woken: StdMutex<Vec<Pid>>,
    }

    impl Scheduler for RecordingScheduler {
        fn block(&self, _pid: Pid) {}

        fn wake(&self, pid: Pid) {
            self.woken.lock().unwrap().push(pid);
        }
    }

    fn kernel() -> (Arc<Kernel>, Arc<ParkingEngine>, Arc<RecordingScheduler>) {
        let engine = Arc::new(ParkingEngine::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let kernel = Kernel::new(
            KernelConfig::new(),
            Arc::new(BufferConsole::new()),
            engine.clone(),
            scheduler.clone(),
        );
        (kernel, engine, scheduler)
    }

    fn image(name: &str) -> ProgramImage {
        ProgramImage {
            name: FileName::try_from(name).unwrap(),
            args: Vec::new(),
        }
    }

    #[test]
    fn failed_load_allocates_no_pid() {
        let (kernel, _, _) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        assert_eq!(
            kernel.spawn(Some(root), image("missing")),
            Err(SyscallError::NotFound)
        );
        assert_eq!(kernel.processes().len(), 1);

        let child = kernel.spawn(Some(root), image("child")).unwrap();
        assert_eq!(child, Pid::new(2));
    }

    #[test]
    fn exit_wakes_joining_parent() {
        let (kernel, engine, scheduler) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        let child = kernel.spawn(Some(root), image("child")).unwrap();

        assert_eq!(kernel.processes().poll_join(root, child), Ok(JoinPoll::Pending));

        let mut process = engine.take(child);
        kernel.exit(&mut process, 5);
        assert!(process.is_terminated());
        assert_eq!(*scheduler.woken.lock().unwrap(), vec![root]);
        assert_eq!(kernel.join(root, child), Ok(Termination::Exited(5)));
    }

    #[test]
    fn abort_marks_child_killed() {
        let (kernel, engine, _) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        let child = kernel.spawn(Some(root), image("child")).unwrap();

        let mut process = engine.take(child);
        let fault = Fault::new(crate::mm::UserAddr::new(0xdead), crate::mm::FaultKind::Unmapped);
        kernel.abort(&mut process, fault);
        // A second termination is ignored.
        kernel.exit(&mut process, 0);

        assert_eq!(
            kernel.processes().state(child),
            Some(ProcessState::Zombie(Termination::Killed))
        );
    }

    #[test]
    fn only_root_may_halt() {
        let (kernel, _, _) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        let child = kernel.spawn(Some(root), image("child")).unwrap();

        assert_eq!(kernel.halt(child), Err(SyscallError::PermissionDenied));
        assert!(!kernel.is_halted());
        assert_eq!(kernel.halt(root), Ok(()));
        assert!(kernel.is_halted());
        assert_eq!(
            kernel.spawn(Some(root), image("late")),
            Err(SyscallError::ShuttingDown)
        );
    }

    #[test]
    fn last_exit_shuts_down() {
        let (kernel, engine, _) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        let mut process = engine.take(root);
        kernel.exit(&mut process, 0);
        assert!(kernel.is_halted());
    }

    #[test]
    fn exit_releases_descriptors() {
        let (kernel, engine, _) = kernel();
        let root = kernel.boot("init", &[]).unwrap();
        let mut process = engine.take(root);

        let name = FileName::try_from("f").unwrap();
        let handle = kernel.files().create(&name, root).unwrap();
        process.files.allocate(handle).unwrap();
        kernel.files().unlink(&name).unwrap();
        assert_eq!(process.files().open_count(), 1);
        assert_eq!(kernel.files().len(), 1);

        kernel.exit(&mut process, 0);
        assert_eq!(process.files().open_count(), 0);
        assert!(kernel.files().is_empty());
    }
}
