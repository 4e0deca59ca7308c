//! `DllMain` for builds that are dropped into the game directory as a proxy library.

use std::ffi::c_void;
use std::sync::Mutex;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use windows::Win32::Foundation::{BOOL, HMODULE, TRUE};
use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

use crate::image::ImageInfo;
use crate::loader::ModuleSet;
use crate::notify;
use crate::version::BuildIdentity;

static MODULES: Mutex<Option<ModuleSet>> = Mutex::new(None);

fn init_logging() {
    let filter = EnvFilter::try_from_env("FKPATCH_LOG").unwrap_or_else(|_| EnvFilter::new("fkpatch=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn attach() {
    init_logging();
    notify::set_message_boxes(true);

    match ImageInfo::current() {
        Ok(image) => match BuildIdentity::from_fingerprint(image.fingerprint()) {
            BuildIdentity::Unsupported => {
                warn!("Unsupported game build (fingerprint {:#010x})", image.fingerprint())
            }
            build => info!("Game build {}", build),
        },
        Err(e) => error!("Could not inspect the game executable: {}", e),
    }

    match ModuleSet::attach_beside_executable() {
        Ok(set) => {
            info!("{} modules loaded, {} failed", set.len(), set.failures().len());
            if let Ok(mut modules) = MODULES.lock() {
                *modules = Some(set);
            }
        }
        Err(e) => error!("Module discovery failed: {}", e),
    }
}

fn detach() {
    if let Ok(mut modules) = MODULES.lock() {
        if let Some(set) = modules.take() {
            set.detach();
        }
    }
}

#[no_mangle]
pub extern "system" fn DllMain(_module: HMODULE, reason: u32, _reserved: *mut c_void) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => attach(),
        DLL_PROCESS_DETACH => detach(),
        _ => {}
    }
    TRUE
}
