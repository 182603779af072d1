//! Static define list (enumeration) export
//!
//! A static define list is an array of `(key, value)` pairs. Keys below
//! [`MARKER_LIMIT`] are markers rather than name pointers:
//!
//! | key | meaning                                             |
//! |-----|-----------------------------------------------------|
//! | 0   | end of list                                         |
//! | 1   | following values are integers                       |
//! | 2   | following values are string pointers                |
//! | 3   | value points to a stash table of further entries    |
//! | 4   | value points to the parent list; ends this list     |

use super::ExportError;
use crate::memory::layout::{native_size, read_native, StaticDefine32};
use crate::memory::source::MemorySource;
use crate::memory::stash::{read_stash_pointers, read_stash_table};
use blobschema::{EnumEntry, EnumValue, EnumValueType, Enumeration};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

const MARKER_END: u64 = 0;
const MARKER_INT: u64 = 1;
const MARKER_STRING: u64 = 2;
const MARKER_DYNAMIC: u64 = 3;
const MARKER_PARENT: u64 = 4;
pub const MARKER_LIMIT: u64 = 16;

/// Upper bound on elements in one list
const MAX_DEFINES: usize = 1 << 16;

/// Exported enumerations plus the address each canonical name came from
#[derive(Debug, Default)]
pub struct EnumExport {
    pub enums: Vec<Enumeration>,
    pub by_address: HashMap<usize, String>,
}

/// Decoded content of one native list
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListContent {
    entries: Vec<EnumEntry>,
    parent: Option<usize>,
}

fn read_list(
    source: &dyn MemorySource,
    list: &str,
    address: usize,
) -> Result<ListContent, ExportError> {
    let stride = native_size::<StaticDefine32>(source.pointer_width());
    let mut value_type = EnumValueType::Int;
    let mut entries = Vec::new();
    let mut parent = None;

    for index in 0..MAX_DEFINES {
        let define = read_native::<StaticDefine32>(source, address + index * stride)?;
        match define.key {
            MARKER_END => return Ok(ListContent { entries, parent }),
            MARKER_INT => value_type = EnumValueType::Int,
            MARKER_STRING => value_type = EnumValueType::String,
            MARKER_DYNAMIC => {
                let dynamic = read_stash_table(source, define.value as usize, |value| {
                    read_value(source, value_type, value as u64)
                })?;
                entries.extend(dynamic.into_iter().map(|e| EnumEntry {
                    name: e.name,
                    value: e.value,
                }));
            }
            MARKER_PARENT => {
                parent = (define.value != 0).then_some(define.value as usize);
                return Ok(ListContent { entries, parent });
            }
            marker if marker < MARKER_LIMIT => {
                return Err(ExportError::InvalidMarker {
                    list: list.to_string(),
                    marker,
                });
            }
            key => {
                let name = source.read_string_ptr(key as usize)?.unwrap_or_default();
                let value = read_value(source, value_type, define.value)?;
                entries.push(EnumEntry { name, value });
            }
        }
    }

    Err(ExportError::Consistency(format!(
        "static define list '{}' has no terminator within {} elements",
        list, MAX_DEFINES
    )))
}

fn read_value(
    source: &dyn MemorySource,
    value_type: EnumValueType,
    raw: u64,
) -> Result<EnumValue, crate::memory::MemoryError> {
    Ok(match value_type {
        // Integers are stored pointer-sized; only the low 32 bits are meaningful
        EnumValueType::Int => EnumValue::Int(raw as u32 as i32),
        EnumValueType::String => {
            EnumValue::Text(source.read_string_ptr(raw as usize)?.unwrap_or_default())
        }
    })
}

fn to_enumeration(name: &str, content: ListContent) -> Enumeration {
    let value_type = if content
        .entries
        .iter()
        .any(|e| matches!(e.value, EnumValue::Text(_)))
    {
        EnumValueType::String
    } else {
        EnumValueType::Int
    };

    let mut enumeration = Enumeration::new(name, value_type);
    enumeration.entries = content
        .entries
        .into_iter()
        .map(|e| match (value_type, e.value) {
            (EnumValueType::String, EnumValue::Int(v)) => EnumEntry::text(e.name, v.to_string()),
            (_, value) => EnumEntry { name: e.name, value },
        })
        .collect();
    enumeration.sort_entries();
    enumeration
}

/// Reserve `base`, or `base` with the lowest numeric suffix still free
fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let name = std::iter::once(base.to_string())
        .chain((2..).map(|n| format!("{}{}", base, n)))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string());
    taken.insert(name.clone());
    name
}

/// Export every static define list named in the root stash table.
///
/// Names sharing one native list become aliases of the first name in sort
/// order. A parent list that is not registered under any name is exported
/// as `<Child>.Parent` so inherited entries survive flattening.
///
/// A name registered twice at different addresses would strictly be a
/// fatal inconsistency. This exporter relaxes that rule: the pair is
/// accepted with a warning when both lists decode to identical content,
/// and only differing content is an error.
pub fn export_enums(source: &dyn MemorySource, root: usize) -> Result<EnumExport, ExportError> {
    let mut stash = read_stash_pointers(source, root)?;
    stash.sort_by(|a, b| a.name.cmp(&b.name));

    let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
    for entry in stash {
        if entry.value == 0 {
            tracing::warn!(name = %entry.name, "static define list with null pointer");
            continue;
        }
        match by_name.get(&entry.name) {
            None => {
                by_name.insert(entry.name, entry.value);
            }
            Some(&existing) if existing == entry.value => {}
            Some(&existing) => {
                let first = read_list(source, &entry.name, existing)?;
                let second = read_list(source, &entry.name, entry.value)?;
                if first != second {
                    return Err(ExportError::Consistency(format!(
                        "enum '{}' is registered at {:#x} and {:#x} with different content",
                        entry.name, existing, entry.value
                    )));
                }
                tracing::warn!(
                    name = %entry.name,
                    "enum registered twice with identical content; keeping {:#x}",
                    existing
                );
            }
        }
    }

    let mut taken: HashSet<String> = by_name.keys().cloned().collect();

    // Group names by list address; the first name in sort order is canonical
    let mut canonical: HashMap<usize, String> = HashMap::new();
    let mut aliases: HashMap<usize, Vec<String>> = HashMap::new();
    let mut order = Vec::new();
    for (name, address) in by_name {
        if canonical.contains_key(&address) {
            aliases.entry(address).or_default().push(name);
        } else {
            canonical.insert(address, name);
            order.push(address);
        }
    }

    let mut enums = Vec::with_capacity(order.len());
    let mut pending: VecDeque<usize> = order.into();
    while let Some(address) = pending.pop_front() {
        let name = canonical[&address].clone();
        let content = read_list(source, &name, address)?;
        let parent = content.parent;

        let mut enumeration = to_enumeration(&name, content);
        enumeration.aliases = aliases.remove(&address).unwrap_or_default();
        if let Some(parent) = parent {
            if !canonical.contains_key(&parent) {
                // Unregistered parent lists are exported under a name derived from the child
                let parent_name = unique_name(&mut taken, &format!("{}.Parent", name));
                tracing::debug!(
                    name = %name,
                    parent = %parent_name,
                    "anonymous parent list {:#x}",
                    parent
                );
                canonical.insert(parent, parent_name);
                pending.push_back(parent);
            }
            enumeration.parent = canonical.get(&parent).cloned();
        }
        tracing::debug!(
            name = %enumeration.name,
            entries = enumeration.entries.len(),
            aliases = enumeration.aliases.len(),
            "exported enum"
        );
        enums.push(enumeration);
    }

    tracing::info!(count = enums.len(), "exported enums");
    Ok(EnumExport {
        enums,
        by_address: canonical,
    })
}
