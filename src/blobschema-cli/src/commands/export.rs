//! Export command handler
//!
//! Attaches to the target, runs the exporters and writes one JSON file per
//! exporter into the output directory.

use crate::cli::TargetArgs;
use crate::config::Config;
use crate::export::{run_exports, ExportKind, ExportOptions, ExportReport};
use crate::memory::suspend::SuspendGuard;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ExportArgs {
    pub target: TargetArgs,
    pub output: Option<PathBuf>,
    pub only: Vec<ExportKind>,
    pub suspend: bool,
    pub cross_check: bool,
}

pub fn handle(args: ExportArgs) -> Result<()> {
    let config = Config::load()?;
    let process = super::attach(&args.target, &config)?;
    let module = process.main_module()?.clone();

    let output = match args.output {
        Some(dir) => dir,
        None => {
            let name = process
                .exe_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("pid{}", process.pid));
            config.schema_root()?.join(name)
        }
    };

    let options = ExportOptions {
        kinds: if args.only.is_empty() {
            ExportKind::ALL.to_vec()
        } else {
            args.only
        },
        block_size: config.block_size(),
        cross_check: args.cross_check,
    };

    let report = {
        let _suspended = if args.suspend {
            Some(SuspendGuard::new(process.pid)?)
        } else {
            None
        };
        run_exports(&process, &module, &options)
    };

    let written = write_report(&report, &output)?;
    for path in &written {
        println!("Wrote {}", path.display());
    }

    if report.is_complete() {
        return Ok(());
    }

    for kind in &report.missed {
        println!("Skipped {}: no signature matched", kind.describe());
    }
    if !report.failed.is_empty() {
        for (kind, error) in &report.failed {
            eprintln!("Failed {}: {}", kind.describe(), error);
        }
        bail!("{} of {} exporters failed", report.failed.len(), options.kinds.len());
    }

    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize export")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write every exporter result present in `report` into `dir`
pub fn write_report(report: &ExportReport, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::new();
    if let Some(enums) = &report.enums {
        let path = dir.join(ExportKind::Enums.file_name());
        write_json(&path, enums)?;
        written.push(path);
    }
    if let Some(tables) = &report.parse_tables {
        let path = dir.join(ExportKind::Parse.file_name());
        write_json(&path, tables)?;
        written.push(path);
    }
    if let Some(functions) = &report.functions {
        let path = dir.join(ExportKind::Functions.file_name());
        write_json(&path, functions)?;
        written.push(path);
    }
    Ok(written)
}
