//! Expression function export
//!
//! The function stash maps names to descriptors holding a return type,
//! an argument array and up to four tag strings. Types are four-character
//! multi-value codes stored little-endian in a `u32`.

use super::ExportError;
use crate::memory::layout::{read_native, read_native_array, ExprFuncArg32, ExprFuncDesc32};
use crate::memory::source::MemorySource;
use crate::memory::stash::read_stash_pointers;
use blobschema::opcode_by_mnemonic;
use serde::{Deserialize, Serialize};

/// Upper bound on declared arguments
const MAX_ARGS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArg {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: String,
    #[serde(default)]
    pub arguments: Vec<FunctionArg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Name of a four-character type code
pub fn type_name(code: u32) -> String {
    if code == 0 {
        return "None".to_string();
    }
    let bytes = code.to_le_bytes();
    match std::str::from_utf8(&bytes) {
        Ok(mnemonic) if bytes.iter().all(|b| b.is_ascii_graphic()) => opcode_by_mnemonic(mnemonic)
            .map(|op| op.name.to_string())
            .unwrap_or_else(|| mnemonic.to_string()),
        _ => format!("{:#010x}", code),
    }
}

fn read_function(
    source: &dyn MemorySource,
    name: String,
    address: usize,
) -> Result<FunctionDef, ExportError> {
    let desc = read_native::<ExprFuncDesc32>(source, address)?;
    if desc.arg_count > MAX_ARGS {
        return Err(ExportError::Consistency(format!(
            "expression function '{}' declares {} arguments",
            name, desc.arg_count
        )));
    }

    let mut arguments = Vec::with_capacity(desc.arg_count as usize);
    if desc.args != 0 {
        let args = read_native_array::<ExprFuncArg32>(
            source,
            desc.args as usize,
            desc.arg_count as usize,
        )?;
        for arg in args {
            arguments.push(FunctionArg {
                name: source.read_string_ptr(arg.name as usize)?.unwrap_or_default(),
                arg_type: type_name(arg.arg_type),
            });
        }
    }

    let mut tags = Vec::new();
    for tag in desc.tags.iter().filter(|&&t| t != 0) {
        if let Some(text) = source.read_string_ptr(*tag as usize)? {
            tags.push(text);
        }
    }

    // Prefer the descriptor's own name; the stash key can be a lowercased copy
    let name = source
        .read_string_ptr(desc.name as usize)?
        .filter(|n| !n.is_empty())
        .unwrap_or(name);

    Ok(FunctionDef {
        name,
        return_type: type_name(desc.return_type),
        arguments,
        tags,
    })
}

/// Export every expression function in the root stash table, sorted by name
pub fn export_functions(
    source: &dyn MemorySource,
    root: usize,
) -> Result<Vec<FunctionDef>, ExportError> {
    let mut functions = Vec::new();
    for entry in read_stash_pointers(source, root)? {
        if entry.value == 0 {
            continue;
        }
        functions.push(read_function(source, entry.name, entry.value)?);
    }

    functions.sort_by(|a, b| a.name.cmp(&b.name));
    functions.dedup_by(|a, b| a == b);
    tracing::info!(count = functions.len(), "exported expression functions");
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::testing::Image;
    use crate::memory::layout::{ExprFuncArg64, ExprFuncDesc64};
    use crate::memory::source::PointerWidth;

    fn code(mnemonic: &[u8; 4]) -> u32 {
        u32::from_le_bytes(*mnemonic)
    }

    fn function(image: &Image, name: &str, ret: u32, args: &[(&str, u32)], tags: &[&str]) -> usize {
        let wide_args: Vec<ExprFuncArg64> = args
            .iter()
            .map(|(n, t)| ExprFuncArg64 {
                name: image.string(n) as u64,
                arg_type: *t,
            })
            .collect();
        let args_at = if args.is_empty() {
            0
        } else {
            image.structs::<ExprFuncArg32>(&wide_args, |w| ExprFuncArg32 {
                name: w.name as u32,
                arg_type: w.arg_type,
            })
        };

        let mut tag_ptrs = [0u64; 4];
        for (slot, tag) in tag_ptrs.iter_mut().zip(tags) {
            *slot = image.string(tag) as u64;
        }
        let desc = ExprFuncDesc64 {
            name: image.string(name) as u64,
            func: 0x401000,
            return_type: ret,
            arg_count: args.len() as u32,
            args: args_at as u64,
            tags: tag_ptrs,
        };
        image.structs::<ExprFuncDesc32>(&[desc], |w| ExprFuncDesc32 {
            name: w.name as u32,
            func: w.func as u32,
            return_type: w.return_type,
            arg_count: w.arg_count,
            args: w.args as u32,
            tags: w.tags.map(|t| t as u32),
        })
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(code(b"S032")), "Int");
        assert_eq!(type_name(code(b"F064")), "Double");
        assert_eq!(type_name(code(b"ZZZZ")), "ZZZZ");
        assert_eq!(type_name(0), "None");
        assert_eq!(type_name(0x0102_0304), "0x01020304");
    }

    #[test]
    fn test_export_functions_both_widths() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let image = Image::new(width);
            let max = function(
                &image,
                "Max",
                code(b"F064"),
                &[("a", code(b"F064")), ("b", code(b"F064"))],
                &["Math", "Pure"],
            );
            let now = function(&image, "Now", code(b"S064"), &[], &[]);
            let root = image.stash(&[("now", now), ("max", max)]);

            let functions = export_functions(&image.source, root).unwrap();
            assert_eq!(functions.len(), 2);
            assert_eq!(
                functions[0],
                FunctionDef {
                    name: "Max".to_string(),
                    return_type: "Double".to_string(),
                    arguments: vec![
                        FunctionArg {
                            name: "a".to_string(),
                            arg_type: "Double".to_string()
                        },
                        FunctionArg {
                            name: "b".to_string(),
                            arg_type: "Double".to_string()
                        },
                    ],
                    tags: vec!["Math".to_string(), "Pure".to_string()],
                }
            );
            assert_eq!(functions[1].name, "Now");
            assert!(functions[1].arguments.is_empty());
            assert!(functions[1].tags.is_empty());
        }
    }

    #[test]
    fn test_too_many_arguments() {
        let image = Image::new(PointerWidth::Bits64);
        let bad = function(&image, "Bad", 0, &[], &[]);
        // arg_count lives at offset 20 in the 64-bit descriptor
        image.source.put_u32(bad + 20, 1000);
        let root = image.stash(&[("Bad", bad)]);
        assert!(matches!(
            export_functions(&image.source, root),
            Err(ExportError::Consistency(_))
        ));
    }
}
