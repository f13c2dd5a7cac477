//! System Call Interface
//!
//! The boundary between user programs and the kernel tables.
//!
//! # Security Model
//! - Whitelist approach: only explicitly implemented syscalls are allowed
//! - All parameters are validated before use
//! - Invalid inputs return -1, never panic and never fault the caller
//!
//! # Syscalls
//! - 0: halt() - shut down (root only)
//! - 1: exit(status) - terminate the calling process
//! - 2: exec(name, argc, argv) - start a child, returns its pid
//! - 3: join(pid, status) - wait for a child, returns 1 or 0
//! - 4: creat(name) - create or truncate a file, returns a descriptor
//! - 5: open(name) - open an existing file, returns a descriptor
//! - 6: read(fd, buf, count) - returns bytes read
//! - 7: write(fd, buf, count) - returns bytes written
//! - 8: close(fd)
//! - 9: unlink(name)

mod handler;
mod validate;

pub use handler::{dispatch, numbers, Completion};
pub use validate::{transfer_count, user_argv, user_buffer, user_file_name};
