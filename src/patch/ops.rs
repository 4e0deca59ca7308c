use tracing::debug;

use crate::debug::log_hex;
use crate::error::{PatchError, Result};
use crate::patch::encode::{ControlTransfer, NOP};
use crate::patch::session::ScopedPatch;

/// Overwrites `size` bytes at `address` with `nop`.
///
/// # Safety
///
/// `[address, address + size)` must be mapped code of this process that no thread is
/// currently executing.
pub unsafe fn fill_nops(address: *mut u8, size: usize) -> Result<()> {
    let mut patch = ScopedPatch::open(address, size)?;
    for _ in 0..size {
        patch.write_u8(NOP);
    }

    debug!(address = format_args!("{:#x}", address as usize), size, "filled with nops");
    log_hex(address as usize, std::slice::from_raw_parts(address, size));
    patch.close()
}

/// Writes `kind` towards `target` at `address` and pads the rest of `total_size` with `nop`.
///
/// Nothing is written, and protection is left untouched, when `total_size` cannot hold the
/// encoding.
///
/// # Safety
///
/// Same as [`fill_nops`] for `[address, address + total_size)`.
pub unsafe fn insert_control_transfer(
    address: *mut u8,
    total_size: usize,
    target: usize,
    kind: ControlTransfer,
) -> Result<()> {
    if address.is_null() || total_size == 0 {
        return Err(PatchError::InvalidArgument { address: address as usize, size: total_size });
    }
    if total_size < kind.width() {
        return Err(PatchError::PatchTooSmall {
            kind,
            required: kind.width(),
            available: total_size,
        });
    }

    let code = kind.encode(address as usize, target);

    let mut patch = ScopedPatch::open(address, total_size)?;
    patch.write_bytes(&code);
    while patch.position() < total_size {
        patch.write_u8(NOP);
    }

    debug!(
        address = format_args!("{:#x}", address as usize),
        target = format_args!("{:#x}", target),
        ?kind,
        total_size,
        "inserted control transfer"
    );
    log_hex(address as usize, std::slice::from_raw_parts(address, total_size));
    patch.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::ScratchPage;

    const GUARD: u8 = 0xCC;
    const MAX_CHECK: usize = 8;

    fn guarded_page() -> ScratchPage {
        let page = ScratchPage::new();
        unsafe { std::ptr::write_bytes(page.ptr(), GUARD, ScratchPage::SIZE) };
        page
    }

    #[test]
    fn test_fill_nops_writes_exactly_n() {
        let page = guarded_page();
        unsafe { fill_nops(page.ptr().add(8), 4) }.unwrap();
        assert_eq!(page.bytes(8, 4), &[0x90, 0x90, 0x90, 0x90]);
        assert_eq!(page.bytes(7, 1), &[GUARD]);
        assert_eq!(page.bytes(12, 1), &[GUARD]);
    }

    #[test]
    fn test_fill_nops_rejects_zero_size() {
        let page = guarded_page();
        let err = unsafe { fill_nops(page.ptr(), 0) }.unwrap_err();
        assert!(matches!(err, PatchError::InvalidArgument { .. }));
        assert_eq!(page.bytes(0, 1), &[GUARD]);
    }

    #[test]
    fn test_natural_width_has_no_padding() {
        let page = guarded_page();
        for (i, kind) in ControlTransfer::ALL.into_iter().enumerate() {
            let offset = 64 + i * 16;
            let address = unsafe { page.ptr().add(offset) };
            let target = 0x0040_1000;
            unsafe { insert_control_transfer(address, kind.width(), target, kind) }.unwrap();
            assert_eq!(
                page.bytes(offset, kind.width()),
                kind.encode(address as usize, target).as_slice()
            );
            assert_eq!(page.bytes(offset + kind.width(), 1), &[GUARD]);
        }
    }

    #[test]
    fn test_wider_window_is_padded_with_nops() {
        let page = guarded_page();
        for (i, kind) in ControlTransfer::ALL.into_iter().enumerate() {
            let offset = 256 + i * 16;
            let total = kind.width() + 3;
            let address = unsafe { page.ptr().add(offset) };
            unsafe { insert_control_transfer(address, total, 0x0040_2000, kind) }.unwrap();
            assert_eq!(page.bytes(offset + kind.width(), 3), &[0x90, 0x90, 0x90]);
            assert_eq!(page.bytes(offset + total, 1), &[GUARD]);
        }
    }

    #[test]
    fn test_undersized_window_writes_nothing() {
        let page = guarded_page();
        for kind in ControlTransfer::ALL {
            let total = kind.width() - 1;
            let err = unsafe { insert_control_transfer(page.ptr(), total, 0x1000, kind) }.unwrap_err();
            match err {
                PatchError::PatchTooSmall { kind: k, required, available } => {
                    assert_eq!(k, kind);
                    assert_eq!(required, kind.width());
                    assert_eq!(available, total);
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(page.bytes(0, MAX_CHECK).iter().all(|&b| b == GUARD));
        }
    }

    #[test]
    fn test_relative_call_to_self_in_memory() {
        let page = guarded_page();
        let address = page.ptr();
        unsafe { insert_control_transfer(address, 8, address as usize, ControlTransfer::Call) }
            .unwrap();
        assert_eq!(
            page.bytes(0, 8),
            &[0xE8, 0xFB, 0xFF, 0xFF, 0xFF, 0x90, 0x90, 0x90]
        );
    }

    #[test]
    fn test_relative_jump_reaches_target_in_memory() {
        let page = guarded_page();
        let address = unsafe { page.ptr().add(200) };
        let target = page.ptr() as usize + 0x800;
        unsafe { insert_control_transfer(address, 5, target, ControlTransfer::Jump) }.unwrap();

        let code = page.bytes(200, 5);
        let disp = i32::from_le_bytes([code[1], code[2], code[3], code[4]]);
        assert_eq!(code[0], 0xE9);
        assert_eq!((address as isize + 5 + disp as isize) as usize, target);
    }
}
