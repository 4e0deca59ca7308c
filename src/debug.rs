use std::sync::atomic::{AtomicBool, Ordering};

pub static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Formats `data` as rows of 16 hex bytes prefixed with their offset.
pub fn format_hex(data: &[u8]) -> Vec<String> {
    const HEX_WIDTH: usize = 16;

    data.chunks(HEX_WIDTH)
        .enumerate()
        .map(|(row, chunk)| {
            let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
            format!("0x{:03x}: {}", row * HEX_WIDTH, bytes.join(" "))
        })
        .collect()
}

#[cfg(feature = "debug")]
pub fn log_hex(address: usize, data: &[u8]) {
    if !is_debug_enabled() {
        return;
    }

    for line in format_hex(data) {
        tracing::trace!(target: "fkpatch::hex", "[{:#010x}] {}", address, line);
    }
}

#[cfg(not(feature = "debug"))]
pub fn log_hex(_address: usize, _data: &[u8]) {}
