//! Command handlers for blobschema CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod configure;
pub mod convert;
pub mod export;
pub mod scan;

use crate::cli::TargetArgs;
use crate::config::Config;
use crate::memory::source::{find_process, RemoteProcess};
use anyhow::{Context, Result};

/// Name used to pick the main module among the target's mappings
fn module_name(process: &RemoteProcess, target: &TargetArgs, config: &Config) -> Result<String> {
    if let Some(name) = target.process.as_ref().or(config.process_name.as_ref()) {
        return Ok(name.clone());
    }
    process
        .exe_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Cannot determine the executable name; pass --process")
}

/// Find and open the target process
pub fn attach(target: &TargetArgs, config: &Config) -> Result<RemoteProcess> {
    let pid = match (target.pid, target.process.as_ref().or(config.process_name.as_ref())) {
        (Some(pid), _) => pid,
        (None, Some(name)) => find_process(name)?,
        (None, None) => anyhow::bail!(
            "No target given. Use --pid, --process, or `blobschema configure --process NAME`."
        ),
    };

    let mut process = RemoteProcess::new(pid);
    let name = module_name(&process, target, config)?;
    process
        .open(&name)
        .with_context(|| format!("Failed to open process {}", pid))?;
    Ok(process)
}
