use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use libc::{
    c_void, dlclose, dlerror, dlopen, mmap, mprotect, munmap, sysconf, MAP_ANON, MAP_FAILED, MAP_PRIVATE,
    PROT_EXEC, PROT_NONE, PROT_READ, PROT_WRITE, RTLD_NOW, _SC_PAGESIZE,
};

use super::Protection;

pub const EXECUTE_READ_WRITE: Protection = Protection((PROT_READ | PROT_WRITE | PROT_EXEC) as u32);
pub const EXECUTE_READ: Protection = Protection((PROT_READ | PROT_EXEC) as u32);

fn page_size() -> usize {
    unsafe { sysconf(_SC_PAGESIZE) as usize }
}

fn page_span(address: usize, size: usize) -> (usize, usize) {
    let page = page_size();
    let base = (address / page) * page;
    let width = ((address + size - 1) / page + 1) * page - base;
    (base, width)
}

fn parse_permissions(perms: &str) -> Protection {
    let bytes = perms.as_bytes();
    let mut flags = PROT_NONE;
    if bytes.first() == Some(&b'r') {
        flags |= PROT_READ;
    }
    if bytes.get(1) == Some(&b'w') {
        flags |= PROT_WRITE;
    }
    if bytes.get(2) == Some(&b'x') {
        flags |= PROT_EXEC;
    }
    Protection(flags as u32)
}

/// Reads the protection of the mapping containing `address` from `/proc/self/maps`.
pub fn query(address: *const u8) -> io::Result<Protection> {
    let address = address as usize;
    let reader = BufReader::new(File::open("/proc/self/maps")?);

    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let (Some(range), Some(perms)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let parse = |s: &str| {
            usize::from_str_radix(s, 16).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };
        if (parse(start)?..parse(end)?).contains(&address) {
            return Ok(parse_permissions(perms));
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("address {:#x} is not mapped", address),
    ))
}

/// Changes the protection of every page touching `[address, address + size)` and returns
/// the protection the first page had before.
pub unsafe fn protect(address: *mut u8, size: usize, protection: Protection) -> io::Result<Protection> {
    let previous = query(address)?;
    restore(address, size, protection)?;
    Ok(previous)
}

/// Sets the protection of every page touching `[address, address + size)` without reading
/// the current one first.
pub unsafe fn restore(address: *mut u8, size: usize, protection: Protection) -> io::Result<()> {
    let (base, width) = page_span(address as usize, size);
    if mprotect(base as *mut c_void, width, protection.0 as i32) == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Maps `size` bytes of private read/write memory.
pub fn allocate(size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        mmap(
            ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE,
            MAP_ANON | MAP_PRIVATE,
            -1,
            0,
        )
    };

    if ptr == MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(ptr as *mut u8)
}

pub unsafe fn free(ptr: *mut u8, size: usize) {
    munmap(ptr as *mut c_void, size);
}

unsafe fn last_dl_error() -> io::Error {
    let message = dlerror();
    let text = if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    io::Error::new(io::ErrorKind::Other, text)
}

pub fn load_library(path: &Path) -> io::Result<*mut c_void> {
    let name = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    unsafe {
        let handle = dlopen(name.as_ptr(), RTLD_NOW);
        if handle.is_null() {
            return Err(last_dl_error());
        }
        Ok(handle)
    }
}

pub unsafe fn free_library(handle: *mut c_void) -> io::Result<()> {
    if dlclose(handle) != 0 {
        return Err(last_dl_error());
    }
    Ok(())
}
