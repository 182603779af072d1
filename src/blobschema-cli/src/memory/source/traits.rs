//! Memory Source Trait
//!
//! Core abstraction for reading another process's address space.

use super::MemoryRegion;
use crate::memory::error::{MemoryError, Result};
use byteorder::{ByteOrder, LE};

/// Upper bound for null-terminated string reads
pub const MAX_STRING_BYTES: usize = 1024 * 1024;

const STRING_CHUNK: usize = 64;

/// Pointer width of the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// Code unit encoding of a null-terminated string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    Utf16,
    Utf32,
}

impl StringEncoding {
    pub fn unit_size(self) -> usize {
        match self {
            StringEncoding::Utf8 => 1,
            StringEncoding::Utf16 => 2,
            StringEncoding::Utf32 => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            StringEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            StringEncoding::Utf16 => {
                let units: Vec<u16> = bytes.chunks_exact(2).map(LE::read_u16).collect();
                String::from_utf16(&units).ok()
            }
            StringEncoding::Utf32 => bytes
                .chunks_exact(4)
                .map(|c| char::from_u32(LE::read_u32(c)))
                .collect(),
        }
    }
}

/// Read/write access to a target address space
pub trait MemorySource {
    /// Read exactly `size` bytes at `address`
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>>;

    /// Write `data` at `address`
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<()>;

    /// Mapped memory regions, sorted by address
    fn regions(&self) -> &[MemoryRegion];

    /// Pointer width of the target, fixed once the source is opened
    fn pointer_width(&self) -> PointerWidth;

    fn read_u32(&self, address: usize) -> Result<u32> {
        Ok(LE::read_u32(&self.read_bytes(address, 4)?))
    }

    fn read_i32(&self, address: usize) -> Result<i32> {
        Ok(LE::read_i32(&self.read_bytes(address, 4)?))
    }

    fn read_u64(&self, address: usize) -> Result<u64> {
        Ok(LE::read_u64(&self.read_bytes(address, 8)?))
    }

    fn write_u32(&self, address: usize, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LE::write_u32(&mut buf, value);
        self.write_bytes(address, &buf)
    }

    fn write_u64(&self, address: usize, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LE::write_u64(&mut buf, value);
        self.write_bytes(address, &buf)
    }

    /// Read a pointer-sized value, widening 32-bit pointers
    fn read_pointer(&self, address: usize) -> Result<usize> {
        match self.pointer_width() {
            PointerWidth::Bits32 => Ok(self.read_u32(address)? as usize),
            PointerWidth::Bits64 => Ok(self.read_u64(address)? as usize),
        }
    }

    /// Read a null-terminated string.
    ///
    /// Reads in growing chunks until a zero code unit is found. Chunks are
    /// clipped to the containing region so a string near the end of a
    /// mapping does not fault the read.
    fn read_string_z(&self, address: usize, encoding: StringEncoding) -> Result<String> {
        let unit = encoding.unit_size();
        let mut bytes = Vec::new();
        let mut chunk = STRING_CHUNK;

        loop {
            let cursor = address + bytes.len();
            let mut want = chunk;
            if let Some(region) = self.find_region(cursor) {
                want = want.min(region.end - cursor).max(unit);
            }
            let data = self.read_bytes(cursor, want)?;

            let start = bytes.len();
            bytes.extend_from_slice(&data);
            let scan_from = start - start % unit;
            let terminator = bytes[scan_from..]
                .chunks_exact(unit)
                .position(|c| c.iter().all(|&b| b == 0));

            if let Some(index) = terminator {
                bytes.truncate(scan_from + index * unit);
                return encoding
                    .decode(&bytes)
                    .ok_or(MemoryError::InvalidString { address, encoding });
            }

            if bytes.len() >= MAX_STRING_BYTES {
                return Err(MemoryError::StringTooLong {
                    address,
                    limit: MAX_STRING_BYTES,
                });
            }
            chunk = (chunk * 2).min(MAX_STRING_BYTES - bytes.len());
        }
    }

    /// Read a UTF-8 string pointed to by `pointer`; null yields `None`
    fn read_string_ptr(&self, pointer: usize) -> Result<Option<String>> {
        if pointer == 0 {
            return Ok(None);
        }
        self.read_string_z(pointer, StringEncoding::Utf8).map(Some)
    }

    /// Find a region containing the given address
    fn find_region(&self, address: usize) -> Option<&MemoryRegion> {
        self.regions().iter().find(|r| r.contains(address))
    }

    /// Check if an address is readable
    fn is_readable(&self, address: usize) -> bool {
        self.find_region(address)
            .map(|r| r.is_readable())
            .unwrap_or(false)
    }
}
