//! Validated file names
//!
//! A [`FileName`] is the only way to name an entry in the file store.
//! Construction enforces the naming rules shared by `creat`, `open`,
//! `unlink` and `exec`.

use alloc::string::String;
use core::fmt;

use crate::error::{SysResult, SyscallError};

/// Maximum length of a file name in bytes, excluding the terminator.
pub const MAX_NAME_LEN: usize = 256;

/// A non-empty file name of at most [`MAX_NAME_LEN`] bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileName(String);

impl FileName {
    /// Build a name from raw bytes read out of user memory.
    ///
    /// # Returns
    /// * `Ok(FileName)` - Name is non-empty, bounded and valid UTF-8
    /// * `Err(InvalidName)` - Any rule is violated
    pub fn from_bytes(bytes: &[u8]) -> SysResult<Self> {
        if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.contains(&0) {
            return Err(SyscallError::InvalidName);
        }

        core::str::from_utf8(bytes)
            .map(|s| Self(String::from(s)))
            .map_err(|_| SyscallError::InvalidName)
    }

    /// Get the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed name.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for FileName {
    type Error = SyscallError;

    fn try_from(s: &str) -> SysResult<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName({:?})", self.0)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
