//! Operating system primitives: page protection, scratch pages and dynamic libraries.
//!
//! Everything above this module is platform independent. Windows is the production target
//! (the host executable is a Win32 program); the Unix backend keeps the engine usable and
//! testable on other hosts.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use self::unix::*;
#[cfg(windows)]
pub use self::windows::*;

/// Raw page protection flags as understood by the operating system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Protection(pub u32);

/// A private read/write page released on drop.
#[cfg(test)]
pub struct ScratchPage {
    ptr: *mut u8,
    size: usize,
}

#[cfg(test)]
impl ScratchPage {
    pub const SIZE: usize = 4096;

    pub fn new() -> Self {
        Self { ptr: allocate(Self::SIZE).unwrap(), size: Self::SIZE }
    }

    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) }
    }
}

#[cfg(test)]
impl Drop for ScratchPage {
    fn drop(&mut self) {
        unsafe { free(self.ptr, self.size) };
    }
}
