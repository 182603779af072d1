//! Schema export from a running client
//!
//! Three exporters (enums, parse tables, expression functions) each find
//! their root stash table through a locator, walk it and produce portable
//! schema data. A locator miss skips that exporter with a warning and an
//! exporter failure does not stop the others.

pub mod enums;
pub mod functions;
pub mod locator;
pub mod parse_tables;
pub mod signatures;

#[cfg(test)]
pub(crate) mod testing;

use crate::memory::binary::ModuleInfo;
use crate::memory::pattern::PatternError;
use crate::memory::source::MemorySource;
use crate::memory::MemoryError;
use blobschema::{Enumeration, SchemaFile};
use locator::{Located, Locator, Signature};
use std::collections::HashMap;

pub use enums::{export_enums, EnumExport};
pub use functions::{export_functions, FunctionArg, FunctionDef};
pub use parse_tables::export_parse_tables;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Schema error: {0}")]
    Schema(#[from] blobschema::Error),

    #[error("Invalid signature: {0}")]
    Signature(#[from] PatternError),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Static define list '{list}' has invalid marker {marker}")]
    InvalidMarker { list: String, marker: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ExportKind {
    Enums,
    Parse,
    Functions,
}

impl ExportKind {
    /// Run order: enums first so parse tables can name their define lists
    pub const ALL: [ExportKind; 3] = [ExportKind::Enums, ExportKind::Parse, ExportKind::Functions];

    pub fn describe(self) -> &'static str {
        match self {
            ExportKind::Enums => "enums",
            ExportKind::Parse => "parse tables",
            ExportKind::Functions => "expression functions",
        }
    }

    pub fn signatures(self) -> &'static [Signature] {
        match self {
            ExportKind::Enums => signatures::ENUM_SIGNATURES,
            ExportKind::Parse => signatures::PARSE_TABLE_SIGNATURES,
            ExportKind::Functions => signatures::EXPR_FUNC_SIGNATURES,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ExportKind::Enums => "enums.json",
            ExportKind::Parse => "parse_tables.json",
            ExportKind::Functions => "expression_functions.json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub kinds: Vec<ExportKind>,
    pub block_size: usize,
    pub cross_check: bool,
}

/// Everything one export run produced
#[derive(Debug, Default)]
pub struct ExportReport {
    pub enums: Option<Vec<Enumeration>>,
    pub parse_tables: Option<SchemaFile>,
    pub functions: Option<Vec<FunctionDef>>,
    /// Exporters skipped because no locator matched
    pub missed: Vec<ExportKind>,
    /// Exporters that failed, with the cause
    pub failed: Vec<(ExportKind, ExportError)>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.missed.is_empty() && self.failed.is_empty()
    }
}

/// Run the requested exporters against `source`
pub fn run_exports(
    source: &dyn MemorySource,
    module: &ModuleInfo,
    options: &ExportOptions,
) -> ExportReport {
    let locator = Locator::new(source, module, options.block_size);
    let mut report = ExportReport::default();
    let mut enum_names: HashMap<usize, String> = HashMap::new();

    for kind in ExportKind::ALL {
        if !options.kinds.contains(&kind) {
            continue;
        }

        let root = match locator.locate(kind.describe(), kind.signatures(), options.cross_check) {
            Ok(Located::Found { global, build }) => {
                tracing::info!(
                    build,
                    global = format_args!("{:#x}", global),
                    "located {}",
                    kind.describe()
                );
                source.read_pointer(global).map_err(ExportError::from)
            }
            Ok(Located::Missed) => {
                tracing::warn!("no signature matched for {}; skipping", kind.describe());
                report.missed.push(kind);
                continue;
            }
            Err(e) => Err(e),
        };

        let result = root.and_then(|root| match kind {
            ExportKind::Enums => export_enums(source, root).map(|export| {
                enum_names = export.by_address;
                report.enums = Some(export.enums);
            }),
            ExportKind::Parse => export_parse_tables(source, root, &enum_names)
                .and_then(|schema| Ok(schema.to_file()?))
                .map(|file| report.parse_tables = Some(file)),
            ExportKind::Functions => {
                export_functions(source, root).map(|f| report.functions = Some(f))
            }
        });

        if let Err(e) = result {
            tracing::error!("{} export failed: {}", kind.describe(), e);
            report.failed.push((kind, e));
        }
    }

    report
}
