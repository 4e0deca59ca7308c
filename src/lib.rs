//! # fkpatch
//!
//! In-memory patching of the Worms 2 executable for FrontendKit modules.
//!
//! - [`image`] reads the host's PE header: code/data ranges and the build fingerprint.
//! - [`version`] turns the fingerprint into a [`BuildIdentity`].
//! - [`patch`] rewrites code inside protection-elevated [`ScopedPatch`] sessions, either one
//!   site at a time or from a per-build [`PatchTable`].
//! - [`loader`] loads every `fk*` module next to the executable and releases them again.
//!
//! ## Feature Flags
//!
//! - `debug`: traces a hex dump of every patched range when [`debug::set_debug`] is on.
//! - `dllmain`: exports a `DllMain` that loads the `fk*` modules on process attach
//!   (Windows only).

pub mod debug;
#[cfg(all(windows, feature = "dllmain"))]
pub mod entry;
pub mod error;
pub mod image;
pub mod loader;
pub mod notify;
pub mod patch;
pub mod sys;
pub mod version;

pub use error::{PatchError, Result};
pub use image::ImageInfo;
pub use loader::{ModuleApi, ModuleHandle, ModulePattern, ModuleSet, SystemModules};
pub use patch::{
    fill_nops, insert_control_transfer, ControlTransfer, PatchAction, PatchSite, PatchTable,
    ScopedPatch,
};
pub use version::BuildIdentity;

use std::os::raw::{c_int, c_void};

use tracing::error;

fn report(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Fills `size` bytes at `address` with `nop`. Returns `false` on failure.
///
/// # Safety
///
/// See [`fill_nops`].
#[no_mangle]
pub unsafe extern "C" fn fkPatchNops(address: *mut c_void, size: usize) -> bool {
    report(fill_nops(address as *mut u8, size))
}

/// Inserts a control transfer of `kind` (0 jump, 1 call, 2 far jump, 3 far call,
/// 4 push/ret) to `target`. Returns `false` on failure.
///
/// # Safety
///
/// See [`insert_control_transfer`].
#[no_mangle]
pub unsafe extern "C" fn fkPatchJump(
    address: *mut c_void,
    size: usize,
    target: *const c_void,
    kind: u32,
) -> bool {
    report(insert_control_transfer(
        address as *mut u8,
        size,
        target as usize,
        ControlTransfer::from_raw(kind),
    ))
}

/// Build index for a fingerprint, `-1` if the build is not supported.
#[no_mangle]
pub extern "C" fn fkGetGameVersion(fingerprint: u32) -> c_int {
    BuildIdentity::from_fingerprint(fingerprint).as_raw()
}
