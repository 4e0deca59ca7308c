use std::ptr;

use tracing::{debug, error};

use crate::error::{PatchError, Result};
use crate::sys::{self, Protection};

/// A writable window over code memory.
///
/// Opening the session makes `[address, address + size)` readable, writable and executable;
/// closing it (explicitly or on drop) puts the saved protection back exactly once.
#[derive(Debug)]
pub struct ScopedPatch {
    address: *mut u8,
    size: usize,
    saved: Protection,
    position: usize,
    closed: bool,
}

impl ScopedPatch {
    /// # Safety
    ///
    /// `address` must point into memory mapped by this process. Nothing else may be
    /// executing the range while it is being rewritten.
    pub unsafe fn open(address: *mut u8, size: usize) -> Result<Self> {
        if address.is_null() || size == 0 {
            return Err(PatchError::InvalidArgument { address: address as usize, size });
        }

        let saved = sys::protect(address, size, sys::EXECUTE_READ_WRITE).map_err(|source| {
            PatchError::ProtectionFailed { address: address as usize, size, source }
        })?;

        debug!(address = format_args!("{:#x}", address as usize), size, ?saved, "patch session opened");

        Ok(Self { address, size, saved, position: 0, closed: false })
    }

    pub fn address(&self) -> *mut u8 {
        self.address
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The protection the range had before the session was opened.
    pub fn saved_protection(&self) -> Protection {
        self.saved
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends `data` at the cursor.
    ///
    /// # Safety
    ///
    /// No bounds check is done against the opened size; the caller sizes its writes.
    pub unsafe fn write_bytes(&mut self, data: &[u8]) {
        ptr::copy_nonoverlapping(data.as_ptr(), self.address.add(self.position), data.len());
        self.position += data.len();
    }

    /// # Safety
    ///
    /// See [`ScopedPatch::write_bytes`].
    pub unsafe fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    /// # Safety
    ///
    /// See [`ScopedPatch::write_bytes`].
    pub unsafe fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// # Safety
    ///
    /// See [`ScopedPatch::write_bytes`].
    pub unsafe fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// # Safety
    ///
    /// See [`ScopedPatch::write_bytes`].
    pub unsafe fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Restores the saved protection. Calling it again after success does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        unsafe { sys::restore(self.address, self.size, self.saved) }.map_err(|source| {
            PatchError::ProtectionRestoreFailed {
                address: self.address as usize,
                size: self.size,
                source,
            }
        })?;

        debug!(
            address = format_args!("{:#x}", self.address as usize),
            written = self.position,
            "patch session closed"
        );
        Ok(())
    }
}

impl Drop for ScopedPatch {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{}", e);
        }
    }
}
