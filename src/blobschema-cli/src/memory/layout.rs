//! Native structure layouts
//!
//! Every structure read from the target has an explicit 32-bit and 64-bit
//! layout. The 64-bit layout is canonical; narrow reads are widened with
//! `upgrade()` right after reading so the exporters never see the
//! difference.

use super::error::Result;
use super::source::{MemorySource, PointerWidth};
use byteorder::{ByteOrder, LE};

/// A fixed-size record with a packed little-endian layout
pub trait NativeLayout: Sized {
    const SIZE: usize;

    fn from_bytes(bytes: &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8>;
}

/// Widening conversion from a 32-bit layout to its 64-bit counterpart
pub trait Upgrade {
    type Wide: NativeLayout;

    fn upgrade(self) -> Self::Wide;
}

/// Read one structure in the target's layout and widen it
pub fn read_native<N>(source: &dyn MemorySource, address: usize) -> Result<N::Wide>
where
    N: NativeLayout + Upgrade,
{
    Ok(read_native_array::<N>(source, address, 1)?.remove(0))
}

/// Bulk-read `count` consecutive structures and widen them
pub fn read_native_array<N>(
    source: &dyn MemorySource,
    address: usize,
    count: usize,
) -> Result<Vec<N::Wide>>
where
    N: NativeLayout + Upgrade,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    match source.pointer_width() {
        PointerWidth::Bits32 => {
            let bytes = source.read_bytes(address, N::SIZE * count)?;
            Ok(bytes
                .chunks_exact(N::SIZE)
                .map(|c| N::from_bytes(c).upgrade())
                .collect())
        }
        PointerWidth::Bits64 => {
            let size = <N::Wide as NativeLayout>::SIZE;
            let bytes = source.read_bytes(address, size * count)?;
            Ok(bytes
                .chunks_exact(size)
                .map(<N::Wide as NativeLayout>::from_bytes)
                .collect())
        }
    }
}

/// Size of one structure in the target's layout
pub fn native_size<N>(width: PointerWidth) -> usize
where
    N: NativeLayout + Upgrade,
{
    match width {
        PointerWidth::Bits32 => N::SIZE,
        PointerWidth::Bits64 => <N::Wide as NativeLayout>::SIZE,
    }
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    LE::write_u32(&mut buf[at..at + 4], value);
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    LE::write_u64(&mut buf[at..at + 8], value);
}

// Stash tables

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StashTableHeader32 {
    pub count: u32,
    pub allocated: u32,
    pub flags: u32,
    pub entries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StashTableHeader64 {
    pub count: u32,
    pub allocated: u32,
    pub flags: u32,
    pub entries: u64,
}

impl NativeLayout for StashTableHeader32 {
    const SIZE: usize = 16;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            count: LE::read_u32(&b[0..4]),
            allocated: LE::read_u32(&b[4..8]),
            flags: LE::read_u32(&b[8..12]),
            entries: LE::read_u32(&b[12..16]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.count);
        put_u32(&mut b, 4, self.allocated);
        put_u32(&mut b, 8, self.flags);
        put_u32(&mut b, 12, self.entries);
        b
    }
}

impl NativeLayout for StashTableHeader64 {
    const SIZE: usize = 24;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            count: LE::read_u32(&b[0..4]),
            allocated: LE::read_u32(&b[4..8]),
            flags: LE::read_u32(&b[8..12]),
            entries: LE::read_u64(&b[16..24]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.count);
        put_u32(&mut b, 4, self.allocated);
        put_u32(&mut b, 8, self.flags);
        put_u64(&mut b, 16, self.entries);
        b
    }
}

impl Upgrade for StashTableHeader32 {
    type Wide = StashTableHeader64;

    fn upgrade(self) -> StashTableHeader64 {
        StashTableHeader64 {
            count: self.count,
            allocated: self.allocated,
            flags: self.flags,
            entries: u64::from(self.entries),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StashEntry32 {
    pub name: u32,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StashEntry64 {
    pub name: u64,
    pub value: u64,
}

impl StashEntry64 {
    pub fn is_empty(&self) -> bool {
        self.name == 0 && self.value == 0
    }
}

impl NativeLayout for StashEntry32 {
    const SIZE: usize = 8;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u32(&b[0..4]),
            value: LE::read_u32(&b[4..8]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.name);
        put_u32(&mut b, 4, self.value);
        b
    }
}

impl NativeLayout for StashEntry64 {
    const SIZE: usize = 16;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u64(&b[0..8]),
            value: LE::read_u64(&b[8..16]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u64(&mut b, 0, self.name);
        put_u64(&mut b, 8, self.value);
        b
    }
}

impl Upgrade for StashEntry32 {
    type Wide = StashEntry64;

    fn upgrade(self) -> StashEntry64 {
        StashEntry64 {
            name: u64::from(self.name),
            value: u64::from(self.value),
        }
    }
}

// Parse table columns

/// One column of a native parse table.
///
/// `type_word` carries the token id in its low byte and the flags above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseColumn32 {
    pub name: u32,
    pub type_word: u64,
    pub offset: u32,
    pub param0: u32,
    pub param1: u32,
    pub format: u32,
    pub format_string: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseColumn64 {
    pub name: u64,
    pub type_word: u64,
    pub offset: u32,
    pub param0: u64,
    pub param1: u64,
    pub format: u32,
    pub format_string: u64,
}

impl NativeLayout for ParseColumn32 {
    const SIZE: usize = 40;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u32(&b[0..4]),
            type_word: LE::read_u64(&b[8..16]),
            offset: LE::read_u32(&b[16..20]),
            param0: LE::read_u32(&b[20..24]),
            param1: LE::read_u32(&b[24..28]),
            format: LE::read_u32(&b[28..32]),
            format_string: LE::read_u32(&b[32..36]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.name);
        put_u64(&mut b, 8, self.type_word);
        put_u32(&mut b, 16, self.offset);
        put_u32(&mut b, 20, self.param0);
        put_u32(&mut b, 24, self.param1);
        put_u32(&mut b, 28, self.format);
        put_u32(&mut b, 32, self.format_string);
        b
    }
}

impl NativeLayout for ParseColumn64 {
    const SIZE: usize = 56;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u64(&b[0..8]),
            type_word: LE::read_u64(&b[8..16]),
            offset: LE::read_u32(&b[16..20]),
            param0: LE::read_u64(&b[24..32]),
            param1: LE::read_u64(&b[32..40]),
            format: LE::read_u32(&b[40..44]),
            format_string: LE::read_u64(&b[48..56]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u64(&mut b, 0, self.name);
        put_u64(&mut b, 8, self.type_word);
        put_u32(&mut b, 16, self.offset);
        put_u64(&mut b, 24, self.param0);
        put_u64(&mut b, 32, self.param1);
        put_u32(&mut b, 40, self.format);
        put_u64(&mut b, 48, self.format_string);
        b
    }
}

impl Upgrade for ParseColumn32 {
    type Wide = ParseColumn64;

    fn upgrade(self) -> ParseColumn64 {
        ParseColumn64 {
            name: u64::from(self.name),
            type_word: self.type_word,
            offset: self.offset,
            param0: u64::from(self.param0),
            param1: u64::from(self.param1),
            format: self.format,
            format_string: u64::from(self.format_string),
        }
    }
}

// Static define lists (enum elements)

/// One element of a static define list.
///
/// `key` is either a name pointer or a small marker value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticDefine32 {
    pub key: u32,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticDefine64 {
    pub key: u64,
    pub value: u64,
}

impl NativeLayout for StaticDefine32 {
    const SIZE: usize = 8;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            key: LE::read_u32(&b[0..4]),
            value: LE::read_u32(&b[4..8]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.key);
        put_u32(&mut b, 4, self.value);
        b
    }
}

impl NativeLayout for StaticDefine64 {
    const SIZE: usize = 16;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            key: LE::read_u64(&b[0..8]),
            value: LE::read_u64(&b[8..16]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u64(&mut b, 0, self.key);
        put_u64(&mut b, 8, self.value);
        b
    }
}

impl Upgrade for StaticDefine32 {
    type Wide = StaticDefine64;

    fn upgrade(self) -> StaticDefine64 {
        StaticDefine64 {
            key: u64::from(self.key),
            value: u64::from(self.value),
        }
    }
}

// Expression functions

pub const EXPR_FUNC_TAGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFuncDesc32 {
    pub name: u32,
    pub func: u32,
    pub return_type: u32,
    pub arg_count: u32,
    pub args: u32,
    pub tags: [u32; EXPR_FUNC_TAGS],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFuncDesc64 {
    pub name: u64,
    pub func: u64,
    pub return_type: u32,
    pub arg_count: u32,
    pub args: u64,
    pub tags: [u64; EXPR_FUNC_TAGS],
}

impl NativeLayout for ExprFuncDesc32 {
    const SIZE: usize = 36;

    fn from_bytes(b: &[u8]) -> Self {
        let mut tags = [0u32; EXPR_FUNC_TAGS];
        for (i, tag) in tags.iter_mut().enumerate() {
            *tag = LE::read_u32(&b[20 + i * 4..24 + i * 4]);
        }
        Self {
            name: LE::read_u32(&b[0..4]),
            func: LE::read_u32(&b[4..8]),
            return_type: LE::read_u32(&b[8..12]),
            arg_count: LE::read_u32(&b[12..16]),
            args: LE::read_u32(&b[16..20]),
            tags,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.name);
        put_u32(&mut b, 4, self.func);
        put_u32(&mut b, 8, self.return_type);
        put_u32(&mut b, 12, self.arg_count);
        put_u32(&mut b, 16, self.args);
        for (i, tag) in self.tags.iter().enumerate() {
            put_u32(&mut b, 20 + i * 4, *tag);
        }
        b
    }
}

impl NativeLayout for ExprFuncDesc64 {
    const SIZE: usize = 64;

    fn from_bytes(b: &[u8]) -> Self {
        let mut tags = [0u64; EXPR_FUNC_TAGS];
        for (i, tag) in tags.iter_mut().enumerate() {
            *tag = LE::read_u64(&b[32 + i * 8..40 + i * 8]);
        }
        Self {
            name: LE::read_u64(&b[0..8]),
            func: LE::read_u64(&b[8..16]),
            return_type: LE::read_u32(&b[16..20]),
            arg_count: LE::read_u32(&b[20..24]),
            args: LE::read_u64(&b[24..32]),
            tags,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u64(&mut b, 0, self.name);
        put_u64(&mut b, 8, self.func);
        put_u32(&mut b, 16, self.return_type);
        put_u32(&mut b, 20, self.arg_count);
        put_u64(&mut b, 24, self.args);
        for (i, tag) in self.tags.iter().enumerate() {
            put_u64(&mut b, 32 + i * 8, *tag);
        }
        b
    }
}

impl Upgrade for ExprFuncDesc32 {
    type Wide = ExprFuncDesc64;

    fn upgrade(self) -> ExprFuncDesc64 {
        ExprFuncDesc64 {
            name: u64::from(self.name),
            func: u64::from(self.func),
            return_type: self.return_type,
            arg_count: self.arg_count,
            args: u64::from(self.args),
            tags: self.tags.map(u64::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFuncArg32 {
    pub name: u32,
    pub arg_type: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFuncArg64 {
    pub name: u64,
    pub arg_type: u32,
}

impl NativeLayout for ExprFuncArg32 {
    const SIZE: usize = 8;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u32(&b[0..4]),
            arg_type: LE::read_u32(&b[4..8]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u32(&mut b, 0, self.name);
        put_u32(&mut b, 4, self.arg_type);
        b
    }
}

impl NativeLayout for ExprFuncArg64 {
    const SIZE: usize = 16;

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            name: LE::read_u64(&b[0..8]),
            arg_type: LE::read_u32(&b[8..12]),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        put_u64(&mut b, 0, self.name);
        put_u32(&mut b, 8, self.arg_type);
        b
    }
}

impl Upgrade for ExprFuncArg32 {
    type Wide = ExprFuncArg64;

    fn upgrade(self) -> ExprFuncArg64 {
        ExprFuncArg64 {
            name: u64::from(self.name),
            arg_type: self.arg_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::source::MockMemorySource;

    #[test]
    fn test_stash_header_upgrade() {
        let narrow = StashTableHeader32 {
            count: 3,
            allocated: 8,
            flags: 0x10,
            entries: 0x8000_1000,
        };
        let wide = narrow.upgrade();
        assert_eq!(wide.count, 3);
        assert_eq!(wide.allocated, 8);
        assert_eq!(wide.flags, 0x10);
        assert_eq!(wide.entries, 0x8000_1000);
    }

    #[test]
    fn test_read_native_by_width() {
        let source = MockMemorySource::zeroed(0x100, 0x1000).with_pointer_width(PointerWidth::Bits32);
        let narrow = ParseColumn32 {
            name: 0x1100,
            type_word: 0x0000_0800_0000_0805,
            offset: 12,
            param0: 0xFFFF_FFFF,
            param1: 0x2000,
            format: 3,
            format_string: 0x1200,
        };
        source.put_bytes(0x1000, &narrow.to_bytes());
        let column = read_native::<ParseColumn32>(&source, 0x1000).unwrap();
        assert_eq!(column, narrow.upgrade());
        assert_eq!(column.param0 as i32, -1);
        assert_eq!(column.param1, 0x2000);

        let wide_source = MockMemorySource::zeroed(0x100, 0x1000);
        let wide = narrow.upgrade();
        wide_source.put_bytes(0x1000, &wide.to_bytes());
        assert_eq!(read_native::<ParseColumn32>(&wide_source, 0x1000).unwrap(), wide);
    }

    #[test]
    fn test_read_native_array() {
        let source = MockMemorySource::zeroed(0x100, 0x1000).with_pointer_width(PointerWidth::Bits32);
        for i in 0..4u32 {
            let entry = StashEntry32 { name: i, value: i * 10 };
            source.put_bytes(0x1000 + i as usize * 8, &entry.to_bytes());
        }
        let entries = read_native_array::<StashEntry32>(&source, 0x1000, 4).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3], StashEntry64 { name: 3, value: 30 });
        assert!(entries[0].is_empty());
        assert!(read_native_array::<StashEntry32>(&source, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(native_size::<ExprFuncDesc32>(PointerWidth::Bits32), 36);
        assert_eq!(native_size::<ExprFuncDesc32>(PointerWidth::Bits64), 64);
        assert_eq!(native_size::<ParseColumn32>(PointerWidth::Bits64), 56);

        let desc = ExprFuncDesc32 {
            name: 1,
            func: 2,
            return_type: 3,
            arg_count: 4,
            args: 5,
            tags: [6, 7, 0, 9],
        };
        assert_eq!(ExprFuncDesc32::from_bytes(&desc.to_bytes()), desc);
        assert_eq!(desc.upgrade().tags, [6, 7, 0, 9]);
        let wide = desc.upgrade();
        assert_eq!(ExprFuncDesc64::from_bytes(&wide.to_bytes()), wide);
    }
}
