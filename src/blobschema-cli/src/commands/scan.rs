//! Scan command handler

use crate::cli::TargetArgs;
use crate::config::Config;
use crate::memory::binary::ModuleInfo;
use crate::memory::pattern::{scan_range, Pattern};
use anyhow::{bail, Context, Result};

/// Address range to scan: explicit, or the rest of the main module
fn scan_bounds(
    module: &ModuleInfo,
    base: Option<usize>,
    size: Option<usize>,
) -> Result<(usize, usize)> {
    match (base, size) {
        (None, _) => Ok((module.base, module.size)),
        (Some(base), Some(size)) => Ok((base, size)),
        (Some(base), None) if module.contains(base) => Ok((base, module.end() - base)),
        (Some(base), None) => bail!(
            "{:#x} is outside the main module ({:#x}..{:#x}); pass --size",
            base,
            module.base,
            module.end()
        ),
    }
}

pub fn handle(
    target: TargetArgs,
    pattern: &str,
    base: Option<usize>,
    size: Option<usize>,
) -> Result<()> {
    let pattern =
        Pattern::parse(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
    let config = Config::load()?;
    let process = super::attach(&target, &config)?;
    let module = process.main_module()?;
    let (start, len) = scan_bounds(module, base, size)?;

    println!(
        "Scanning {:#x}..{:#x} for {}",
        start,
        start + len,
        pattern
    );
    match scan_range(&process, start, len, &pattern, config.block_size())? {
        Some(address) if module.contains(address) => {
            println!("Found at {:#x} (module+{:#x})", address, address - module.base)
        }
        Some(address) => println!("Found at {:#x}", address),
        None => println!("Not found"),
    }
    Ok(())
}
