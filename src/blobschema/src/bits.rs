//! Bit-level packing for bit columns
//!
//! Consecutive bit columns share one little-endian accumulator of at most
//! 128 bits. Each column addresses its value by bit index (the column offset)
//! and width. The run occupies only as many bytes as its highest bit needs.

use crate::cursor::{ByteReader, ByteWriter};
use crate::{Error, Result};

/// Largest bit index (exclusive) a run can address
pub const MAX_RUN_BITS: u32 = 128;

/// Widest single bit column
pub const MAX_BIT_WIDTH: u32 = 64;

fn mask(width: u32) -> u128 {
    if width >= MAX_BIT_WIDTH {
        u64::MAX as u128
    } else {
        (1u128 << width) - 1
    }
}

/// Largest value a field of `width` bits can hold
pub fn field_max(width: u32) -> u64 {
    mask(width) as u64
}

/// Bit index one past the field at `offset`, which must lie inside a run
pub fn field_end(offset: u32, width: u32) -> Result<u32> {
    offset
        .checked_add(width)
        .filter(|&end| end <= MAX_RUN_BITS)
        .ok_or_else(|| {
            Error::InvalidSchema(format!(
                "bit field at {} with width {} is beyond a {}-bit run",
                offset, width, MAX_RUN_BITS
            ))
        })
}

/// Read `width` bits at bit index `offset` of `word`
pub fn read_bits(word: u128, offset: u32, width: u32) -> u64 {
    if width == 0 || offset >= MAX_RUN_BITS {
        return 0;
    }
    ((word >> offset) & mask(width)) as u64
}

/// Replace `width` bits at bit index `offset` of `word` with `value`
pub fn write_bits(word: u128, offset: u32, width: u32, value: u64) -> u128 {
    if width == 0 || offset >= MAX_RUN_BITS {
        return word;
    }
    let field = mask(width) << offset;
    (word & !field) | (((value as u128) << offset) & field)
}

fn bytes_for(bit_end: u32) -> usize {
    bit_end.div_ceil(8) as usize
}

/// Pulls bytes for a bit run lazily as columns address higher bits
#[derive(Debug, Default)]
pub struct BitRunReader {
    value: u128,
    loaded: usize,
}

impl BitRunReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, reader: &mut ByteReader, offset: u32, width: u32) -> Result<u64> {
        let needed = bytes_for(field_end(offset, width)?);
        while self.loaded < needed {
            let byte = reader.read_u8()?;
            self.value |= (byte as u128) << (8 * self.loaded);
            self.loaded += 1;
        }
        Ok(read_bits(self.value, offset, width))
    }

    /// Bytes consumed so far by this run
    pub fn loaded(&self) -> usize {
        self.loaded
    }
}

/// Accumulates a bit run and writes it when the run ends
#[derive(Debug, Default)]
pub struct BitRunWriter {
    value: u128,
    used: usize,
}

impl BitRunWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in the field; bits above `width` are dropped
    pub fn write(&mut self, offset: u32, width: u32, value: u64) -> Result<()> {
        let end = field_end(offset, width)?;
        self.value = write_bits(self.value, offset, width, value);
        self.used = self.used.max(bytes_for(end));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Write the accumulated bytes and reset
    pub fn flush(&mut self, writer: &mut ByteWriter) -> Result<()> {
        let bytes = self.value.to_le_bytes();
        writer.write_bytes(&bytes[..self.used])?;
        self.value = 0;
        self.used = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_bits_all_positions() {
        for width in 1..=32u32 {
            for offset in 0..=63u32 {
                let value = 0xDEAD_BEEF_u64 & mask(width) as u64;
                let word = write_bits(0, offset, width, value);
                assert_eq!(read_bits(word, offset, width), value, "width {width} offset {offset}");
            }
        }
    }

    #[test]
    fn test_write_bits_preserves_neighbours() {
        let word = write_bits(u64::MAX as u128, 8, 4, 0);
        assert_eq!(word, u64::MAX as u128 & !(0xF << 8));
        assert_eq!(read_bits(word, 0, 8), 0xFF);
        assert_eq!(read_bits(word, 12, 4), 0xF);
    }

    #[test]
    fn test_write_bits_truncates_value() {
        let word = write_bits(0, 0, 3, 0xFF);
        assert_eq!(word, 0b111);
    }

    #[test]
    fn test_run_reader_lazy() {
        let data = [0b1010_0101, 0xFF, 0x01];
        let mut reader = ByteReader::new(&data);
        let mut run = BitRunReader::new();

        assert_eq!(run.read(&mut reader, 0, 4).unwrap(), 0b0101);
        assert_eq!(run.loaded(), 1);
        assert_eq!(run.read(&mut reader, 4, 4).unwrap(), 0b1010);
        assert_eq!(run.read(&mut reader, 8, 9).unwrap(), 0x1FF);
        assert_eq!(run.loaded(), 3);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_run_writer_roundtrip() {
        let mut run = BitRunWriter::new();
        run.write(0, 3, 5).unwrap();
        run.write(3, 1, 1).unwrap();
        run.write(10, 6, 33).unwrap();

        let mut writer = ByteWriter::new();
        run.flush(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 2);

        let mut reader = ByteReader::new(&bytes);
        let mut read = BitRunReader::new();
        assert_eq!(read.read(&mut reader, 0, 3).unwrap(), 5);
        assert_eq!(read.read(&mut reader, 3, 1).unwrap(), 1);
        assert_eq!(read.read(&mut reader, 10, 6).unwrap(), 33);
        assert!(run.is_empty());
    }

    #[test]
    fn test_field_end_bounds() {
        assert_eq!(field_end(0, 8).unwrap(), 8);
        assert_eq!(field_end(64, 64).unwrap(), 128);
        assert!(field_end(120, 9).is_err());
        assert!(field_end(u32::MAX, 8).is_err());
        assert_eq!(field_max(4), 15);
        assert_eq!(field_max(64), u64::MAX);
    }

    #[test]
    fn test_run_rejects_out_of_range_fields() {
        let data = [0u8; 16];
        let mut reader = ByteReader::new(&data);
        assert!(matches!(
            BitRunReader::new().read(&mut reader, u32::MAX, 8),
            Err(Error::InvalidSchema(_))
        ));
        assert_eq!(reader.position(), 0);

        let mut run = BitRunWriter::new();
        assert!(run.write(u32::MAX - 2, 8, 1).is_err());
        assert!(run.write(125, 4, 1).is_err());
        assert!(run.is_empty());
    }
}
