// ABOUTME: Fixed-size buffer for passwords, pinned in memory and wiped on drop.
// ABOUTME: Only ever filled in place so no unprotected copy of the secret is left behind.

use crate::prompt::read_line_into;
use std::fmt;
use std::io::{self, Read};
use tracing::debug;
use zeroize::Zeroize;

/// Capacity of a password buffer, including room for the line terminator.
pub const SECRET_CAPACITY: usize = 1024;

/// Holds one password line.
///
/// The backing storage is `mlock`ed where the platform allows it, and is
/// zeroed then unlocked when the buffer goes away, on every exit path.
pub struct SecretBuffer {
    buf: Box<[u8]>,
    len: usize,
    locked: bool,
}

impl SecretBuffer {
    pub fn new() -> Self {
        let buf = vec![0u8; SECRET_CAPACITY].into_boxed_slice();
        let locked = lock_memory(&buf);
        if !locked {
            debug!("password buffer could not be locked in memory");
        }
        Self {
            buf,
            len: 0,
            locked,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Reads one line from `reader`, dropping a single trailing newline.
    ///
    /// At most `SECRET_CAPACITY - 1` bytes are taken. Returns the stored length.
    pub fn fill_line_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.clear();
        let limit = self.buf.len() - 1;
        let read = read_line_into(reader, &mut self.buf[..limit])?;
        self.len = trimmed_len(&self.buf[..read]);
        Ok(self.len)
    }

    /// Replaces the content with `bytes`, truncated to the buffer capacity.
    pub fn set(&mut self, bytes: &[u8]) {
        self.clear();
        let len = bytes.len().min(self.buf.len() - 1);
        self.buf[..len].copy_from_slice(&bytes[..len]);
        self.len = len;
    }

    pub fn clear(&mut self) {
        self.buf[..].zeroize();
        self.len = 0;
    }
}

impl Default for SecretBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.buf[..].zeroize();
        if self.locked {
            unlock_memory(&self.buf);
        }
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.len)
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

fn trimmed_len(line: &[u8]) -> usize {
    match line {
        [rest @ .., b'\r', b'\n'] => rest.len(),
        [rest @ .., b'\n'] => rest.len(),
        _ => line.len(),
    }
}

#[cfg(unix)]
fn lock_memory(buf: &[u8]) -> bool {
    // SAFETY: the range covers a live allocation owned by the caller.
    unsafe { libc::mlock(buf.as_ptr().cast(), buf.len()) == 0 }
}

#[cfg(unix)]
fn unlock_memory(buf: &[u8]) {
    // SAFETY: same range that was passed to mlock.
    unsafe {
        libc::munlock(buf.as_ptr().cast(), buf.len());
    }
}

#[cfg(not(unix))]
fn lock_memory(_buf: &[u8]) -> bool {
    false
}

#[cfg(not(unix))]
fn unlock_memory(_buf: &[u8]) {}
