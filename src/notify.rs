//! Best-effort user notices.
//!
//! Every notice is logged. When message boxes are enabled (the `DllMain` entry point does
//! this on Windows) the notice is also shown as a modal warning, which is how the host
//! game's players actually get to see it.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

pub const CAPTION: &str = "FrontendKit";

static MESSAGE_BOXES: AtomicBool = AtomicBool::new(false);

pub fn set_message_boxes(enabled: bool) {
    MESSAGE_BOXES.store(enabled, Ordering::Relaxed);
}

pub fn message_boxes_enabled() -> bool {
    MESSAGE_BOXES.load(Ordering::Relaxed)
}

pub fn warning(message: &str) {
    warn!("{}", message);

    #[cfg(windows)]
    if message_boxes_enabled() {
        crate::sys::message_box(CAPTION, message);
    }
}
