//! Read-only view of a PE image already mapped into this process.
//!
//! Headers are read straight from memory. Nothing is validated: the base address must be
//! that of a loaded module, which is a precondition of every constructor.

use std::mem;
use std::ops::Range;
use std::ptr;

pub const IMAGE_NT_OPTIONAL_HDR32_MAGIC: u16 = 0x10b;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageDosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    pub e_lfanew: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageFileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Leading fields shared by the optional headers this crate looks at.
///
/// `base_of_data` only exists in PE32 headers; for PE32+ the same slot is the low half of
/// the image base and must be ignored.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImageOptionalHeaderPrefix {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
}

/// Offset of the file header from the start of the NT headers (after the `PE\0\0` signature).
const FILE_HEADER_OFFSET: usize = 4;
const OPTIONAL_HEADER_OFFSET: usize = FILE_HEADER_OFFSET + mem::size_of::<ImageFileHeader>();

#[derive(Debug)]
pub struct ImageInfo {
    base: *const u8,
    fingerprint: u32,
    code: Range<usize>,
    data: Range<usize>,
}

impl ImageInfo {
    /// Inspects the executable that started this process.
    #[cfg(windows)]
    pub fn current() -> crate::error::Result<Self> {
        let base = crate::sys::current_module_base()?;
        Ok(unsafe { Self::from_base(base) })
    }

    /// # Safety
    ///
    /// `base` must be the base address of a PE image mapped into this process.
    pub unsafe fn from_base(base: *const u8) -> Self {
        let mut image = Self {
            base,
            fingerprint: 0,
            code: 0..0,
            data: 0..0,
        };
        image.reset(base);
        image
    }

    /// Re-reads every cached field from the module at `base`.
    ///
    /// # Safety
    ///
    /// Same as [`ImageInfo::from_base`].
    pub unsafe fn reset(&mut self, base: *const u8) {
        let dos = ptr::read_unaligned(base as *const ImageDosHeader);
        let nt = base.offset(dos.e_lfanew as isize);
        let file = ptr::read_unaligned(nt.add(FILE_HEADER_OFFSET) as *const ImageFileHeader);
        let opt = ptr::read_unaligned(nt.add(OPTIONAL_HEADER_OFFSET) as *const ImageOptionalHeaderPrefix);

        let start = base as usize;
        let code_start = start + opt.base_of_code as usize;
        self.code = code_start..code_start + opt.size_of_code as usize;

        self.data = if opt.magic == IMAGE_NT_OPTIONAL_HDR32_MAGIC {
            let data_start = start + opt.base_of_data as usize;
            let data_size = opt.size_of_initialized_data as usize + opt.size_of_uninitialized_data as usize;
            data_start..data_start + data_size
        } else {
            0..0
        };

        self.base = base;
        self.fingerprint = file.time_date_stamp;
    }

    pub fn base(&self) -> *const u8 {
        self.base
    }

    /// Link timestamp of the image, which identifies the build.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// Absolute address of `rva`. Not checked against the image bounds.
    pub fn offset(&self, rva: u32) -> usize {
        self.base as usize + rva as usize
    }

    pub fn code_range(&self) -> Range<usize> {
        self.code.clone()
    }

    pub fn data_range(&self) -> Range<usize> {
        self.data.clone()
    }

    pub fn in_code(&self, address: usize) -> bool {
        self.code.contains(&address)
    }

    pub fn in_data(&self, address: usize) -> bool {
        self.data.contains(&address)
    }
}
