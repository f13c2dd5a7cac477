//! Console device
//!
//! Backs descriptors 0 and 1 of every process. The kernel only needs a
//! byte-oriented device; [`BufferConsole`] is an in-memory one.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spin::Mutex;

/// A serial console shared by every process.
pub trait Console: Send + Sync {
    /// Read whatever input is available, up to `buf.len()` bytes.
    ///
    /// Never blocks; returns 0 if no input is pending.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&self, data: &[u8]) -> usize;
}

/// In-memory console with a pending input queue and a captured output log.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for later reads from descriptor 0.
    pub fn push_input(&self, data: &[u8]) {
        self.input.lock().extend(data.iter().copied());
    }

    /// Take everything written to descriptor 1 so far.
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut *self.output.lock())
    }
}

impl Console for BufferConsole {
    fn read(&self, buf: &mut [u8]) -> usize {
        let mut input = self.input.lock();
        let n = buf.len().min(input.len());
        for (dst, src) in buf.iter_mut().zip(input.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn write(&self, data: &[u8]) -> usize {
        self.output.lock().extend_from_slice(data);
        data.len()
    }
}
