use std::path::PathBuf;

use thiserror::Error;

use crate::patch::ControlTransfer;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Address and size must not be 0 (address {address:#x}, size {size})")]
    InvalidArgument { address: usize, size: usize },

    #[error("Failed to make {size} bytes at {address:#x} writable: {source}")]
    ProtectionFailed {
        address: usize,
        size: usize,
        source: std::io::Error,
    },

    #[error("Failed to restore protection of {size} bytes at {address:#x}: {source}")]
    ProtectionRestoreFailed {
        address: usize,
        size: usize,
        source: std::io::Error,
    },

    #[error("Not enough space to patch {kind:?}: needs {required} bytes, got {available}")]
    PatchTooSmall {
        kind: ControlTransfer,
        required: usize,
        available: usize,
    },

    #[error("Unsupported build with fingerprint {0:#010x}")]
    UnsupportedBuild(u32),

    #[error("Could not load module {}: {source}", path.display())]
    ModuleLoadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PatchError>;

impl PatchError {
    /// Whether the error left memory in an elevated protection state.
    pub fn is_restore_failure(&self) -> bool {
        matches!(self, PatchError::ProtectionRestoreFailed { .. })
    }
}
