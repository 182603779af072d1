//! `configure`: persist defaults for attaching and schema lookup

use crate::config::Config;
use anyhow::Result;
use std::fmt::Write as _;
use std::path::PathBuf;

const USAGE: &str = "\
Usage: blobschema configure --process NAME --schema-dir DIR [--block-size BYTES]
   or: blobschema configure --parser-hash TABLE=0xHASH
   or: blobschema configure --show";

/// Settings requested on the command line
#[derive(Debug, Default)]
pub struct Changes {
    pub process: Option<String>,
    pub schema_dir: Option<PathBuf>,
    pub block_size: Option<usize>,
    pub parser_hashes: Vec<(String, u32)>,
}

impl Changes {
    /// Merge into `config`, returning the names of the settings touched
    fn apply(self, config: &mut Config) -> Vec<&'static str> {
        let mut touched = Vec::new();
        if let Some(process) = self.process {
            config.process_name = Some(process);
            touched.push("process");
        }
        if let Some(dir) = self.schema_dir {
            config.schema_dir = Some(dir);
            touched.push("schema_dir");
        }
        if let Some(size) = self.block_size {
            config.scan_block_size = Some(size);
            touched.push("scan_block_size");
        }
        if !self.parser_hashes.is_empty() {
            config.parser_hashes.extend(self.parser_hashes);
            touched.push("parser_hashes");
        }
        touched
    }
}

pub fn handle(changes: Changes, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        print!("{}", summary(&config)?);
        return Ok(());
    }

    let touched = changes.apply(&mut config);
    if touched.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    config.save()?;
    tracing::info!(settings = ?touched, "configuration updated");
    if let Ok(path) = Config::config_path() {
        println!("Saved {} to {}", touched.join(", "), path.display());
    }
    Ok(())
}

/// Human-readable listing of the effective settings
fn summary(config: &Config) -> Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "process      {}",
        config.process_name.as_deref().unwrap_or("(not set)")
    )?;
    writeln!(out, "schema_dir   {}", config.schema_root()?.display())?;
    writeln!(out, "block_size   {:#x}", config.block_size())?;
    for (table, hash) in &config.parser_hashes {
        writeln!(out, "parser_hash  {} = {:#010x}", table, hash)?;
    }
    if let Ok(path) = Config::config_path() {
        writeln!(out, "config_file  {}", path.display())?;
    }
    Ok(out)
}
