//! File subsystem
//!
//! - [`FileStore`]: process-wide name registry with reference counting
//! - [`FileHandle`]: a private cursor created by each `creat`/`open`
//! - [`HandleTable`]: per-process descriptor slots
//! - [`Console`]: the device behind descriptors 0 and 1

mod console;
mod handle;
mod name;
mod store;
mod table;

pub use console::{BufferConsole, Console};
pub use handle::{Access, FileHandle};
pub use name::{FileName, MAX_NAME_LEN};
pub use store::{FileId, FileStat, FileStore};
pub use table::{Fd, HandleTable, OpenFile, MAX_OPEN_FILES};
