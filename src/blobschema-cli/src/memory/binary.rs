//! Main module identification
//!
//! Locates the target's executable image among its mappings and reads the
//! image header to learn the module size and the target pointer width:
//! PE32 vs PE32+ from the optional header magic, or the ELF class byte.

use super::source::{MemoryRegion, MemorySource, PointerWidth};

use anyhow::{bail, Result};
use byteorder::{ByteOrder, LE};

/// Location of `e_lfanew` in the DOS header
const PE_HEADER_OFFSET_LOCATION: usize = 0x3C;
const PE_HEADER_MAX_OFFSET: usize = 0x1000;
const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
/// Offset of SizeOfImage within the optional header (same for PE32 and PE32+)
const SIZE_OF_IMAGE_OFFSET: usize = 56;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELF_CLASS_32: u8 = 1;
const ELF_CLASS_64: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Pe,
    Elf,
}

/// The executable image of the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub base: usize,
    pub size: usize,
    pub format: ImageFormat,
    pub pointer_width: PointerWidth,
}

impl ModuleInfo {
    pub fn end(&self) -> usize {
        self.base + self.size
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Image header facts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub format: ImageFormat,
    pub pointer_width: PointerWidth,
    /// Declared image size (PE only)
    pub image_size: Option<usize>,
}

/// Parse the image header at `base`
pub fn read_image_header(source: &dyn MemorySource, base: usize) -> Result<ImageHeader> {
    let dos_header = source.read_bytes(base, 64)?;

    if &dos_header[0..4] == ELF_MAGIC {
        let pointer_width = match dos_header[4] {
            ELF_CLASS_32 => PointerWidth::Bits32,
            ELF_CLASS_64 => PointerWidth::Bits64,
            class => bail!("Unknown ELF class {} at {:#x}", class, base),
        };
        return Ok(ImageHeader {
            format: ImageFormat::Elf,
            pointer_width,
            image_size: None,
        });
    }

    if &dos_header[0..2] != b"MZ" {
        bail!("No MZ or ELF signature at {:#x}", base);
    }

    let pe_offset =
        LE::read_u32(&dos_header[PE_HEADER_OFFSET_LOCATION..PE_HEADER_OFFSET_LOCATION + 4])
            as usize;
    if pe_offset == 0 || pe_offset > PE_HEADER_MAX_OFFSET {
        bail!("Invalid PE offset: {:#x}", pe_offset);
    }

    // PE signature + COFF header + start of the optional header
    let pe_header = source.read_bytes(base + pe_offset, 24 + SIZE_OF_IMAGE_OFFSET + 4)?;
    if &pe_header[0..4] != b"PE\0\0" {
        bail!("Invalid PE signature at {:#x}", base + pe_offset);
    }

    let optional = &pe_header[24..];
    let pointer_width = match LE::read_u16(&optional[0..2]) {
        PE32_MAGIC => PointerWidth::Bits32,
        PE32_PLUS_MAGIC => PointerWidth::Bits64,
        magic => bail!("Unknown optional header magic {:#x}", magic),
    };
    let image_size =
        LE::read_u32(&optional[SIZE_OF_IMAGE_OFFSET..SIZE_OF_IMAGE_OFFSET + 4]) as usize;

    Ok(ImageHeader {
        format: ImageFormat::Pe,
        pointer_width,
        image_size: Some(image_size),
    })
}

/// Find the main module: the lowest mapping whose path contains `name`
/// and that starts with an image header.
pub fn find_main_module(source: &dyn MemorySource, name: &str) -> Result<ModuleInfo> {
    let mapped: Vec<&MemoryRegion> = source
        .regions()
        .iter()
        .filter(|r| r.is_mapped_from(name))
        .collect();

    for region in mapped.iter().filter(|r| r.is_readable()) {
        let header = match read_image_header(source, region.start) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(start = format_args!("{:#x}", region.start), "not an image: {e}");
                continue;
            }
        };

        // ELF images have no declared size; use the extent of the file mapping
        let size = match header.image_size {
            Some(size) => size,
            None => {
                let end = mapped
                    .iter()
                    .filter(|r| r.start >= region.start)
                    .map(|r| r.end)
                    .max()
                    .unwrap_or(region.end);
                end - region.start
            }
        };

        return Ok(ModuleInfo {
            base: region.start,
            size,
            format: header.format,
            pointer_width: header.pointer_width,
        });
    }

    bail!("No mapped image matching '{}'", name)
}
