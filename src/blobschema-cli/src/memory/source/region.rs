//! Mapped address ranges of a target process

use bitflags::bitflags;

bitflags! {
    /// Access bits of a mapping, from the `rwxp` column of /proc/pid/maps
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        const READ = 1;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const SHARED = 1 << 3;
    }
}

impl Protection {
    pub fn from_maps(perms: &str) -> Self {
        let bits = perms.as_bytes();
        let mut protection = Protection::empty();
        for (index, flag, letter) in [
            (0, Protection::READ, b'r'),
            (1, Protection::WRITE, b'w'),
            (2, Protection::EXEC, b'x'),
            (3, Protection::SHARED, b's'),
        ] {
            if bits.get(index) == Some(&letter) {
                protection |= flag;
            }
        }
        protection
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: usize,
    pub end: usize,
    pub protection: Protection,
    /// Backing file, absent for anonymous mappings
    pub path: Option<String>,
}

impl MemoryRegion {
    pub fn new(start: usize, end: usize, perms: &str, path: Option<&str>) -> Self {
        Self {
            start,
            end,
            protection: Protection::from_maps(perms),
            path: path.map(str::to_string),
        }
    }

    pub fn contains(&self, address: usize) -> bool {
        (self.start..self.end).contains(&address)
    }

    pub fn is_readable(&self) -> bool {
        self.protection.contains(Protection::READ)
    }

    /// Case-insensitive substring match on the backing file path
    pub fn is_mapped_from(&self, name: &str) -> bool {
        let needle = name.to_ascii_lowercase();
        self.path
            .as_deref()
            .is_some_and(|p| p.to_ascii_lowercase().contains(&needle))
    }
}

/// Coalesce adjacent readable regions into `(start, end)` spans.
///
/// Regions must be sorted by start address.
pub fn readable_spans<'a>(regions: impl IntoIterator<Item = &'a MemoryRegion>) -> Vec<(usize, usize)> {
    regions
        .into_iter()
        .filter(|r| r.is_readable())
        .fold(Vec::new(), |mut spans: Vec<(usize, usize)>, region| {
            match spans.last_mut() {
                Some((_, end)) if *end == region.start => *end = region.end,
                _ => spans.push((region.start, region.end)),
            }
            spans
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_from_maps() {
        assert_eq!(Protection::from_maps("r-xp"), Protection::READ | Protection::EXEC);
        assert_eq!(
            Protection::from_maps("rw-s"),
            Protection::READ | Protection::WRITE | Protection::SHARED
        );
        assert_eq!(Protection::from_maps("---p"), Protection::empty());
        assert_eq!(Protection::from_maps(""), Protection::empty());
        assert!(!MemoryRegion::new(0, 0x1000, "-w-p", None).is_readable());
    }

    #[test]
    fn test_region_contains() {
        let region = MemoryRegion::new(0x1000, 0x2000, "r--p", None);
        assert!(region.contains(0x1000));
        assert!(region.contains(0x1fff));
        assert!(!region.contains(0x2000));
        assert!(!region.contains(0xfff));
    }

    #[test]
    fn test_is_mapped_from() {
        let region = MemoryRegion::new(0, 0x1000, "r--p", Some("/games/GameClient.exe"));
        assert!(region.is_mapped_from("gameclient"));
        assert!(!region.is_mapped_from("launcher"));
        assert!(!MemoryRegion::new(0, 0x1000, "r--p", None).is_mapped_from("gameclient"));
    }

    #[test]
    fn test_readable_spans_merge_and_split() {
        let regions = vec![
            MemoryRegion::new(0x1000, 0x2000, "r--p", None),
            MemoryRegion::new(0x2000, 0x3000, "r-xp", None),
            MemoryRegion::new(0x3000, 0x4000, "---p", None),
            MemoryRegion::new(0x4000, 0x5000, "rw-p", None),
            MemoryRegion::new(0x6000, 0x7000, "r--p", None),
        ];
        assert_eq!(
            readable_spans(&regions),
            vec![(0x1000, 0x3000), (0x4000, 0x5000), (0x6000, 0x7000)]
        );
    }
}
