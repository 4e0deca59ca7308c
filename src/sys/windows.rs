use std::ffi::c_void;
use std::io;
use std::mem;
use std::path::Path;

use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{FreeLibrary, HMODULE, HWND};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, LoadLibraryW};
use windows::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, VirtualQuery, MEMORY_BASIC_INFORMATION,
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
    PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
};
use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONWARNING};

use super::Protection;

pub const EXECUTE_READ_WRITE: Protection = Protection(PAGE_EXECUTE_READWRITE.0);
pub const EXECUTE_READ: Protection = Protection(PAGE_EXECUTE_READ.0);

pub fn query(address: *const u8) -> io::Result<Protection> {
    let mut info = MEMORY_BASIC_INFORMATION::default();
    let written = unsafe {
        VirtualQuery(
            Some(address as *const c_void),
            &mut info,
            mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Protection(info.Protect.0))
}

/// Changes the protection of `[address, address + size)` and returns the previous one.
pub unsafe fn protect(address: *mut u8, size: usize, protection: Protection) -> io::Result<Protection> {
    let mut previous = PAGE_PROTECTION_FLAGS(0);
    VirtualProtect(
        address as *const c_void,
        size,
        PAGE_PROTECTION_FLAGS(protection.0),
        &mut previous,
    )
    .map_err(|_| io::Error::last_os_error())?;
    Ok(Protection(previous.0))
}

/// Puts `protection` back on `[address, address + size)`, discarding the replaced flags.
pub unsafe fn restore(address: *mut u8, size: usize, protection: Protection) -> io::Result<()> {
    protect(address, size, protection).map(|_| ())
}

/// Commits `size` bytes of private read/write memory.
pub fn allocate(size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe { VirtualAlloc(None, size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

pub unsafe fn free(ptr: *mut u8, _size: usize) {
    let released = VirtualFree(ptr as *mut c_void, 0, MEM_RELEASE);
    debug_assert!(released.is_ok(), "VirtualFree failed: {:?}", released);
}

pub fn load_library(path: &Path) -> io::Result<*mut c_void> {
    let name = HSTRING::from(path.as_os_str());
    let module = unsafe { LoadLibraryW(&name) }.map_err(|_| io::Error::last_os_error())?;
    Ok(module.0)
}

pub unsafe fn free_library(handle: *mut c_void) -> io::Result<()> {
    FreeLibrary(HMODULE(handle)).map_err(|_| io::Error::last_os_error())
}

/// Base address of the executable the process was started from.
pub fn current_module_base() -> io::Result<*const u8> {
    let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.map_err(|_| io::Error::last_os_error())?;
    Ok(module.0 as *const u8)
}

pub fn message_box(caption: &str, text: &str) {
    unsafe {
        MessageBoxW(
            HWND::default(),
            &HSTRING::from(text),
            &HSTRING::from(caption),
            MB_ICONWARNING,
        );
    }
}
