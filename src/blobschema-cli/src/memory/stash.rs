//! Stash table reader
//!
//! A stash table is the target's open-addressed name → pointer map. The
//! header holds the capacity and a pointer to the slot array; unused slots
//! have both name and value null.

use super::error::{MemoryError, Result};
use super::layout::{read_native, read_native_array, StashEntry32, StashTableHeader32};
use super::source::MemorySource;

/// Upper bound on slots read from one table
pub const MAX_STASH_SLOTS: u32 = 1 << 22;

/// One populated slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry<T> {
    pub name: String,
    pub value: T,
}

/// Read every populated slot of the table at `header`, in storage order.
///
/// `transform` turns each value pointer into the caller's type. A null
/// header or an unallocated table yields no entries; a header whose count
/// exceeds its slot count is rejected.
pub fn read_stash_table<T, F>(
    source: &dyn MemorySource,
    header: usize,
    mut transform: F,
) -> Result<Vec<StashEntry<T>>>
where
    F: FnMut(usize) -> Result<T>,
{
    if header == 0 {
        return Ok(Vec::new());
    }

    let address = header;
    let header = read_native::<StashTableHeader32>(source, address)?;
    if header.count > header.allocated {
        return Err(MemoryError::CorruptStash {
            address,
            count: header.count,
            allocated: header.allocated,
        });
    }
    if header.allocated == 0 || header.entries == 0 {
        return Ok(Vec::new());
    }

    let slots = header.allocated.min(MAX_STASH_SLOTS);
    if slots < header.allocated {
        tracing::warn!(allocated = header.allocated, "stash table truncated");
    }

    let raw = read_native_array::<StashEntry32>(source, header.entries as usize, slots as usize)?;
    let mut entries = Vec::with_capacity(header.count.min(slots) as usize);
    for slot in raw.into_iter().filter(|s| !s.is_empty()) {
        let name = source.read_string_ptr(slot.name as usize)?.unwrap_or_default();
        entries.push(StashEntry {
            name,
            value: transform(slot.value as usize)?,
        });
    }

    Ok(entries)
}

/// Stash table whose values are raw pointers
pub fn read_stash_pointers(
    source: &dyn MemorySource,
    header: usize,
) -> Result<Vec<StashEntry<usize>>> {
    read_stash_table(source, header, Ok)
}
