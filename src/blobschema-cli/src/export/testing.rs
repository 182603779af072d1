//! Synthetic target images for exporter tests

use crate::memory::layout::{
    NativeLayout, StashEntry32, StashEntry64, StashTableHeader32, StashTableHeader64, Upgrade,
};
use crate::memory::source::{MockMemorySource, PointerWidth};
use std::cell::Cell;

pub const IMAGE_BASE: usize = 0x100000;
const IMAGE_SIZE: usize = 0x40000;

/// Bump allocator over a mock address space
pub struct Image {
    pub source: MockMemorySource,
    next: Cell<usize>,
}

impl Image {
    pub fn new(width: PointerWidth) -> Self {
        Self {
            source: MockMemorySource::zeroed(IMAGE_SIZE, IMAGE_BASE).with_pointer_width(width),
            next: Cell::new(IMAGE_BASE + 0x100),
        }
    }

    pub fn is_narrow(&self) -> bool {
        self.source.pointer_width == PointerWidth::Bits32
    }

    pub fn alloc(&self, size: usize) -> usize {
        let at = self.next.get();
        self.next.set((at + size + 15) & !15);
        at
    }

    pub fn string(&self, text: &str) -> usize {
        let at = self.alloc(text.len() + 1);
        self.source.put_str(at, text);
        at
    }

    /// Write structures in the image's native layout, given their wide form
    pub fn structs<N>(&self, items: &[N::Wide], narrow: impl Fn(&N::Wide) -> N) -> usize
    where
        N: NativeLayout + Upgrade,
    {
        let bytes: Vec<u8> = if self.is_narrow() {
            items.iter().flat_map(|w| narrow(w).to_bytes()).collect()
        } else {
            items.iter().flat_map(|w| w.to_bytes()).collect()
        };
        let at = self.alloc(bytes.len().max(1));
        self.source.put_bytes(at, &bytes);
        at
    }

    /// Stash table with a free slot between every entry
    pub fn stash(&self, entries: &[(&str, usize)]) -> usize {
        let mut slots = Vec::new();
        for (name, value) in entries {
            slots.push(StashEntry64 { name: 0, value: 0 });
            slots.push(StashEntry64 {
                name: self.string(name) as u64,
                value: *value as u64,
            });
        }
        slots.push(StashEntry64 { name: 0, value: 0 });

        let array = self.structs::<StashEntry32>(&slots, |w| StashEntry32 {
            name: w.name as u32,
            value: w.value as u32,
        });
        let header = StashTableHeader64 {
            count: entries.len() as u32,
            allocated: slots.len() as u32,
            flags: 0,
            entries: array as u64,
        };
        self.structs::<StashTableHeader32>(&[header], |w| StashTableHeader32 {
            count: w.count,
            allocated: w.allocated,
            flags: w.flags,
            entries: w.entries as u32,
        })
    }

    /// A pointer-sized global holding `value`
    pub fn global(&self, value: usize) -> usize {
        let at = self.alloc(8);
        self.source.put_pointer(at, value);
        at
    }
}
