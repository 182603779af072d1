//! Core CLI definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::export::ExportKind;

#[derive(Parser)]
#[command(name = "blobschema")]
#[command(about = "Export parse schemas from a running client and convert blob files", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export parse tables, enums and expression functions from a live process
    #[command(visible_alias = "e")]
    Export {
        #[command(flatten)]
        target: TargetArgs,

        /// Output directory (defaults to <schema dir>/<process name>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only run these exporters
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<ExportKind>,

        /// Suspend the target while scanning
        #[arg(long)]
        suspend: bool,

        /// Try every signature and fail if they disagree
        #[arg(long)]
        cross_check: bool,
    },

    /// Convert between blob files and structured text
    #[command(visible_alias = "c")]
    Convert {
        /// Decode blobs to structured text
        #[arg(short = 'x', long, conflicts_with = "xml2bin")]
        bin2xml: bool,

        /// Encode structured text to a blob
        #[arg(short = 'b', long)]
        xml2bin: bool,

        /// Schema name (under the schema directory) or path
        #[arg(short, long)]
        schema: String,

        /// Root table (defaults to the input file stem)
        #[arg(short, long)]
        table: Option<String>,

        /// Input file or directory
        input: PathBuf,

        /// Output file or directory
        output: Option<PathBuf>,
    },

    /// Search a live module for a byte pattern
    #[command(visible_alias = "s")]
    Scan {
        #[command(flatten)]
        target: TargetArgs,

        /// Pattern of hex bytes, `??` for wildcards (e.g. "48 8B 05 ?? ?? ?? ??")
        pattern: String,

        /// Start address (defaults to the main module base)
        #[arg(long, value_parser = parse_address)]
        base: Option<usize>,

        /// Bytes to scan from the start address
        #[arg(long, value_parser = parse_address, requires = "base")]
        size: Option<usize>,
    },

    /// Configure default settings
    #[command(visible_alias = "cfg")]
    Configure {
        /// Set the target process name
        #[arg(long)]
        process: Option<String>,

        /// Set the schema directory
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Set the scan block size in bytes
        #[arg(long)]
        block_size: Option<usize>,

        /// Record the expected parser hash for a table (TABLE=HASH)
        #[arg(long, value_parser = parse_table_hash)]
        parser_hash: Vec<(String, u32)>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

/// How to find the target process
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Process id
    #[arg(short, long, conflicts_with = "process")]
    pub pid: Option<u32>,

    /// Process name (defaults to the configured name)
    #[arg(long)]
    pub process: Option<String>,
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
pub fn parse_address(text: &str) -> Result<usize, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", text, e))
}

fn parse_table_hash(text: &str) -> Result<(String, u32), String> {
    let (table, hash) = text
        .split_once('=')
        .ok_or_else(|| format!("expected TABLE=HASH, got '{}'", text))?;
    let hash = parse_address(hash)?;
    let hash = u32::try_from(hash).map_err(|_| format!("hash '{}' exceeds 32 bits", text))?;
    Ok((table.trim().to_string(), hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1000"), Ok(0x1000));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("zz").is_err());
    }

    #[test]
    fn test_parse_table_hash() {
        assert_eq!(
            parse_table_hash("Items=0xAABBCCDD"),
            Ok(("Items".to_string(), 0xAABBCCDD))
        );
        assert!(parse_table_hash("Items").is_err());
        assert!(parse_table_hash("Items=0x1FFFFFFFF").is_err());
    }

    #[test]
    fn test_export_only_list() {
        let cli = Cli::try_parse_from([
            "blobschema",
            "export",
            "--pid",
            "42",
            "--only",
            "enums,functions",
        ])
        .unwrap();
        match cli.command {
            Commands::Export { target, only, .. } => {
                assert_eq!(target.pid, Some(42));
                assert_eq!(only, vec![ExportKind::Enums, ExportKind::Functions]);
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_convert_flags() {
        let cli = Cli::try_parse_from(["blobschema", "convert", "-x", "-s", "game", "in.bin"]).unwrap();
        match cli.command {
            Commands::Convert {
                bin2xml,
                xml2bin,
                schema,
                input,
                output,
                ..
            } => {
                assert!(bin2xml);
                assert!(!xml2bin);
                assert_eq!(schema, "game");
                assert_eq!(input, PathBuf::from("in.bin"));
                assert!(output.is_none());
            }
            _ => panic!("expected convert"),
        }

        assert!(Cli::try_parse_from(["blobschema", "convert", "-x", "-b", "-s", "g", "in"]).is_err());
    }
}
