//! Mock Memory Source
//!
//! A synthetic address space for testing pattern scanning, native layouts
//! and the exporters without a live process.

use super::{MemoryRegion, MemorySource, PointerWidth};
use crate::memory::error::{MemoryError, Result};
use byteorder::{ByteOrder, LE};
use std::cell::RefCell;

/// A mock memory source backed by one contiguous buffer
pub struct MockMemorySource {
    /// Raw memory data (contiguous, starting at base_address)
    pub data: RefCell<Vec<u8>>,
    /// Base virtual address for the data
    pub base_address: usize,
    /// Memory regions (for region-based operations)
    pub regions: Vec<MemoryRegion>,
    pub pointer_width: PointerWidth,
}

impl MockMemorySource {
    /// Create a new 64-bit mock with data at given base address
    pub fn new(data: Vec<u8>, base_address: usize) -> Self {
        let end = base_address + data.len();
        Self {
            data: RefCell::new(data),
            base_address,
            regions: vec![MemoryRegion::new(base_address, end, "rw-p", None)],
            pointer_width: PointerWidth::Bits64,
        }
    }

    /// Zero-filled mock of `size` bytes
    pub fn zeroed(size: usize, base_address: usize) -> Self {
        Self::new(vec![0; size], base_address)
    }

    /// Create with multiple regions
    pub fn with_regions(data: Vec<u8>, base_address: usize, regions: Vec<MemoryRegion>) -> Self {
        Self {
            data: RefCell::new(data),
            base_address,
            regions,
            pointer_width: PointerWidth::Bits64,
        }
    }

    pub fn with_pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = width;
        self
    }

    pub fn put_bytes(&self, address: usize, bytes: &[u8]) {
        let offset = address - self.base_address;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn put_u32(&self, address: usize, value: u32) {
        let mut buf = [0u8; 4];
        LE::write_u32(&mut buf, value);
        self.put_bytes(address, &buf);
    }

    pub fn put_u64(&self, address: usize, value: u64) {
        let mut buf = [0u8; 8];
        LE::write_u64(&mut buf, value);
        self.put_bytes(address, &buf);
    }

    /// Store a pointer using the mock's pointer width
    pub fn put_pointer(&self, address: usize, value: usize) {
        match self.pointer_width {
            PointerWidth::Bits32 => self.put_u32(address, value as u32),
            PointerWidth::Bits64 => self.put_u64(address, value as u64),
        }
    }

    /// Store a null-terminated UTF-8 string
    pub fn put_str(&self, address: usize, text: &str) {
        self.put_bytes(address, text.as_bytes());
        self.put_bytes(address + text.len(), &[0]);
    }

    fn offset(&self, address: usize, size: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base_address)?;
        (offset + size <= self.data.borrow().len()).then_some(offset)
    }
}

impl MemorySource for MockMemorySource {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>> {
        let offset = self.offset(address, size).ok_or(MemoryError::Access {
            address,
            requested: size,
            reason: "outside mock address space".to_string(),
        })?;
        Ok(self.data.borrow()[offset..offset + size].to_vec())
    }

    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<()> {
        self.offset(address, data.len()).ok_or(MemoryError::Write {
            address,
            size: data.len(),
            reason: "outside mock address space".to_string(),
        })?;
        self.put_bytes(address, data);
        Ok(())
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }
}
