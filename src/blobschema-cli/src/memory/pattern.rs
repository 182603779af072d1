//! Byte pattern matching with wildcards
//!
//! Patterns are written IDA-style (`48 8B 0D ?? ?? ?? ??`). A byte matches
//! when `data & mask == value & mask`; `??` has mask 0x00 and a literal
//! byte has mask 0xFF.

use super::error::MemoryError;
use super::source::{readable_spans, MemorySource};
use std::fmt;

/// Default block size for scanning a live module
pub const DEFAULT_BLOCK_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    values: Vec<u8>,
    mask: Vec<u8>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("Empty pattern")]
    Empty,
    #[error("Invalid pattern byte '{0}'")]
    InvalidByte(String),
}

impl Pattern {
    pub fn new(values: Vec<u8>, mask: Vec<u8>) -> Result<Self, PatternError> {
        if values.is_empty() || values.len() != mask.len() {
            return Err(PatternError::Empty);
        }
        Ok(Self { values, mask })
    }

    /// Parse a whitespace separated pattern; `?` and `??` are wildcards
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut values = Vec::new();
        let mut mask = Vec::new();
        for part in text.split_whitespace() {
            if part == "?" || part == "??" {
                values.push(0);
                mask.push(0);
                continue;
            }
            let byte = u8::from_str_radix(part, 16)
                .ok()
                .filter(|_| part.len() == 2)
                .ok_or_else(|| PatternError::InvalidByte(part.to_string()))?;
            values.push(byte);
            mask.push(0xFF);
        }
        Self::new(values, mask)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the pattern at the start of `data`
    #[inline]
    pub fn matches_at(&self, data: &[u8]) -> bool {
        data.len() >= self.len()
            && self
                .values
                .iter()
                .zip(&self.mask)
                .zip(data)
                .all(|((&v, &m), &d)| d & m == v & m)
    }

    /// Longest contiguous run of exact bytes: (start_offset, bytes)
    fn anchor(&self) -> (usize, &[u8]) {
        let mut best = (0, 0);
        let mut current_start = 0;
        let mut current_len = 0;

        for (i, &m) in self.mask.iter().enumerate() {
            if m == 0xFF {
                if current_len == 0 {
                    current_start = i;
                }
                current_len += 1;
                if current_len > best.1 {
                    best = (current_start, current_len);
                }
            } else {
                current_len = 0;
            }
        }

        (best.0, &self.values[best.0..best.0 + best.1])
    }

    /// Lowest offset in `data` where the pattern matches.
    ///
    /// Candidates come from a memchr search for the longest exact run and
    /// each is verified against the whole pattern. The search resumes one
    /// byte past every rejected hit, so the result is the same as checking
    /// every offset in order.
    pub fn find_first(&self, data: &[u8]) -> Option<usize> {
        if data.len() < self.len() {
            return None;
        }

        let (anchor_offset, anchor_bytes) = self.anchor();
        if anchor_bytes.is_empty() {
            return (0..=data.len() - self.len()).find(|&i| self.matches_at(&data[i..]));
        }

        let finder = memchr::memmem::Finder::new(anchor_bytes);
        let last_start = data.len() - self.len();
        let mut from = anchor_offset;
        while let Some(hit) = finder.find(&data[from..]) {
            let start = from + hit - anchor_offset;
            if start > last_start {
                return None;
            }
            if self.matches_at(&data[start..]) {
                return Some(start);
            }
            // Rejected candidates may overlap the next anchor hit
            from += hit + 1;
        }
        None
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (&v, &m)) in self.values.iter().zip(&self.mask).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if m == 0 {
                f.write_str("??")?;
            } else {
                write!(f, "{:02X}", v)?;
            }
        }
        Ok(())
    }
}

/// Scan `[base, base + size)` of a target for the first match.
///
/// Readable memory is read in blocks of `block_size` bytes; consecutive
/// blocks overlap by `pattern.len() - 1` so a match straddling a block
/// boundary is still found. Returns the absolute address.
pub fn scan_range(
    source: &dyn MemorySource,
    base: usize,
    size: usize,
    pattern: &Pattern,
    block_size: usize,
) -> Result<Option<usize>, MemoryError> {
    let end = base + size;
    let block_size = block_size.max(pattern.len());
    let step = block_size - (pattern.len() - 1);

    let regions = source
        .regions()
        .iter()
        .filter(|r| r.end > base && r.start < end);

    for (span_start, span_end) in readable_spans(regions) {
        let span_start = span_start.max(base);
        let span_end = span_end.min(end);

        let mut block = span_start;
        while block + pattern.len() <= span_end {
            let len = block_size.min(span_end - block);
            let data = source.read_bytes(block, len)?;
            if let Some(offset) = pattern.find_first(&data) {
                return Ok(Some(block + offset));
            }
            block += step;
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::source::{MemoryRegion, MockMemorySource};

    fn exact(bytes: &[u8]) -> Pattern {
        Pattern::new(bytes.to_vec(), vec![0xFF; bytes.len()]).unwrap()
    }

    #[test]
    fn test_parse_pattern() {
        let pattern = Pattern::parse("48 8B 0D ?? ?? ? e8").unwrap();
        assert_eq!(pattern.len(), 7);
        assert_eq!(pattern.to_string(), "48 8B 0D ?? ?? ?? E8");

        assert_eq!(Pattern::parse(""), Err(PatternError::Empty));
        assert_eq!(
            Pattern::parse("48 XY"),
            Err(PatternError::InvalidByte("XY".to_string()))
        );
        assert!(Pattern::parse("488B").is_err());
    }

    #[test]
    fn test_first_match_exact() {
        let data = b"hello world hello";
        assert_eq!(exact(b"hello").find_first(data), Some(0));
        assert_eq!(exact(b"world").find_first(data), Some(6));
        assert_eq!(exact(b"xyz").find_first(data), None);
        assert_eq!(exact(b"hello world hello!").find_first(data), None);
    }

    #[test]
    fn test_first_match_with_wildcards() {
        let data = b"test1234test5678";
        let pattern = Pattern::parse("74 65 73 74 ?? ?? 37 ??").unwrap();
        assert_eq!(pattern.find_first(data), Some(8));

        let all_wild = Pattern::parse("?? ??").unwrap();
        assert_eq!(all_wild.find_first(data), Some(0));
    }

    #[test]
    fn test_partial_mask() {
        let pattern = Pattern::new(vec![0x40, 0x8B], vec![0xF0, 0xFF]).unwrap();
        assert_eq!(pattern.find_first(&[0x00, 0x4C, 0x8B]), Some(1));
        assert_eq!(pattern.find_first(&[0x5C, 0x8B]), None);
    }

    #[test]
    fn test_overlapping_candidates() {
        // A failed candidate must not skip ahead past a real match
        let data = [0xAA, 0xAA, 0xAA, 0xBB];
        assert_eq!(exact(&[0xAA, 0xAA, 0xBB]).find_first(&data), Some(1));

        let pattern = Pattern::parse("AA AA ?? BB").unwrap();
        assert_eq!(pattern.find_first(&[0xAA, 0xAA, 0xAA, 0x00, 0xBB]), Some(1));

        let pattern = Pattern::parse("?? 10 10 ?? 20").unwrap();
        let data = [0x10, 0x10, 0x10, 0x10, 0x00, 0x20];
        assert_eq!(pattern.find_first(&data), Some(1));
    }

    #[test]
    fn test_match_at_last_offset() {
        let data = [0x00, 0x01, 0x02, 0xAA, 0xAA, 0xBB];
        assert_eq!(exact(&[0xAA, 0xAA, 0xBB]).find_first(&data), Some(3));
        assert_eq!(Pattern::parse("AA ?? BB").unwrap().find_first(&data), Some(3));
        assert_eq!(Pattern::parse("AA BB ??").unwrap().find_first(&data), None);
    }

    #[test]
    fn test_inserted_pattern_found_at_offset() {
        let pattern = Pattern::parse("48 8B 0D ?? ?? ?? ?? 48 85 C9 74 ?? E8").unwrap();
        let mut filler: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(pattern.find_first(&filler), None);

        let insert = [0x48, 0x8B, 0x0D, 1, 2, 3, 4, 0x48, 0x85, 0xC9, 0x74, 9, 0xE8];
        filler[1234..1234 + insert.len()].copy_from_slice(&insert);
        assert_eq!(pattern.find_first(&filler), Some(1234));
    }

    #[test]
    fn test_scan_range_across_block_boundary() {
        let needle = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        let pattern = exact(&needle);

        for start in 60..64 {
            let mut data = vec![0u8; 256];
            data[start..start + needle.len()].copy_from_slice(&needle);
            let source = MockMemorySource::new(data, 0x10000);
            let found = scan_range(&source, 0x10000, 256, &pattern, 64).unwrap();
            assert_eq!(found, Some(0x10000 + start));
        }
    }

    #[test]
    fn test_scan_range_returns_first_match() {
        let mut data = vec![0u8; 512];
        data[300..304].copy_from_slice(b"FIND");
        data[100..104].copy_from_slice(b"FIND");
        let source = MockMemorySource::new(data, 0x2000);
        let found = scan_range(&source, 0x2000, 512, &exact(b"FIND"), 128).unwrap();
        assert_eq!(found, Some(0x2000 + 100));
    }

    #[test]
    fn test_scan_range_skips_unreadable() {
        let mut data = vec![0u8; 0x200];
        data[0x10..0x14].copy_from_slice(b"TEST");
        data[0x110..0x114].copy_from_slice(b"TEST");
        let source = MockMemorySource::with_regions(
            data,
            0x1000,
            vec![
                MemoryRegion::new(0x1000, 0x1100, "---p", None),
                MemoryRegion::new(0x1100, 0x1200, "r--p", None),
            ],
        );
        let found = scan_range(&source, 0x1000, 0x200, &exact(b"TEST"), 64).unwrap();
        assert_eq!(found, Some(0x1110));
    }

    #[test]
    fn test_scan_range_limits() {
        let mut data = vec![0u8; 0x100];
        data[0xF0..0xF4].copy_from_slice(b"TEST");
        let source = MockMemorySource::new(data, 0x1000);
        assert_eq!(
            scan_range(&source, 0x1000, 0xF2, &exact(b"TEST"), 64).unwrap(),
            None
        );
        assert_eq!(
            scan_range(&source, 0x1000, 0x100, &exact(b"TEST"), 64).unwrap(),
            Some(0x10F0)
        );
    }
}
