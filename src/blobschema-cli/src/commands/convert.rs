//! Convert command handler
//!
//! Decodes blobs to structured text (`-x`) or encodes structured text back
//! to blobs (`-b`). With neither flag the mode follows the input: a
//! directory decodes every `.bin` inside, a `.bin` file decodes and any
//! other file encodes.

use crate::config::Config;
use crate::export::ExportKind;
use crate::file_io::{read_input, write_output, TextFormat};
use crate::file_utils::{collect_files_with_extension, has_extension};
use anyhow::{bail, Context, Result};
use blobschema::{BlobFile, Enumeration, RecordCodec, Schema, SchemaFile};
use std::fs;
use std::path::{Path, PathBuf};

const BLOB_EXTENSIONS: &[&str] = &["bin"];
const TEXT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Decode,
    Encode,
}

impl Mode {
    pub fn detect(bin2xml: bool, xml2bin: bool, input: &Path) -> Mode {
        if bin2xml {
            Mode::Decode
        } else if xml2bin {
            Mode::Encode
        } else if input.is_dir() || has_extension(input, BLOB_EXTENSIONS) {
            Mode::Decode
        } else {
            Mode::Encode
        }
    }

    fn input_extensions(self) -> &'static [&'static str] {
        match self {
            Mode::Decode => BLOB_EXTENSIONS,
            Mode::Encode => TEXT_EXTENSIONS,
        }
    }

    fn output_extension(self) -> &'static str {
        match self {
            Mode::Decode => "json",
            Mode::Encode => "bin",
        }
    }
}

pub struct ConvertArgs {
    pub bin2xml: bool,
    pub xml2bin: bool,
    pub schema: String,
    pub table: Option<String>,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
}

/// Load an exported schema directory, or a single schema file
pub fn load_schema(path: &Path) -> Result<Schema> {
    let (tables_path, enums_path) = if path.is_dir() {
        (
            path.join(ExportKind::Parse.file_name()),
            Some(path.join(ExportKind::Enums.file_name())),
        )
    } else {
        (path.to_path_buf(), None)
    };

    let text = fs::read_to_string(&tables_path)
        .with_context(|| format!("Failed to read schema {}", tables_path.display()))?;
    let mut file: SchemaFile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse schema {}", tables_path.display()))?;

    if let Some(enums_path) = enums_path.filter(|p| p.exists()) {
        let text = fs::read_to_string(&enums_path)
            .with_context(|| format!("Failed to read {}", enums_path.display()))?;
        let enums: Vec<Enumeration> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", enums_path.display()))?;
        for enumeration in enums {
            if !file.enums.iter().any(|e| e.name == enumeration.name) {
                file.enums.push(enumeration);
            }
        }
    }

    let schema = Schema::from_file(&file)
        .with_context(|| format!("Invalid schema {}", tables_path.display()))?;
    tracing::info!(
        tables = schema.table_count(),
        enums = schema.enums.len(),
        "loaded schema from {}",
        path.display()
    );
    Ok(schema)
}

/// Root table name for a file: explicit, or the file stem
fn table_name(table: Option<&str>, input: &Path) -> Result<String> {
    match table {
        Some(name) => Ok(name.to_string()),
        None => input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive a table name from {}", input.display())),
    }
}

pub struct Converter<'a> {
    schema: &'a Schema,
    codec: RecordCodec<'a>,
    config: &'a Config,
    table: Option<&'a str>,
}

impl<'a> Converter<'a> {
    pub fn new(schema: &'a Schema, config: &'a Config, table: Option<&'a str>) -> Self {
        Self {
            schema,
            codec: RecordCodec::new(schema),
            config,
            table,
        }
    }

    fn root(&self, input: &Path) -> Result<(String, blobschema::TableId)> {
        let name = table_name(self.table, input)?;
        let id = self
            .schema
            .table_by_name(&name)
            .ok_or_else(|| blobschema::Error::UnknownTable(name.clone()))?;
        Ok((name, id))
    }

    /// Decode one blob; `output` of `None` writes to stdout
    pub fn decode(&self, input: &Path, output: Option<&Path>) -> Result<()> {
        let (name, root) = self.root(input)?;
        let data = read_input(input)?;
        let blob = BlobFile::decode(&data, &self.codec, root, self.config.parser_hash(&name))
            .with_context(|| format!("Failed to decode {} as '{}'", input.display(), name))?;

        let format = output.map(TextFormat::from_path).unwrap_or(TextFormat::Json);
        let text = format.render(&blob)?;
        write_output(output, text.as_bytes())?;
        tracing::debug!(records = blob.records.len(), "decoded {}", input.display());
        Ok(())
    }

    /// Encode one structured text file; `output` of `None` writes to stdout
    pub fn encode(&self, input: &Path, output: Option<&Path>) -> Result<()> {
        let (name, root) = self.root(input)?;
        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let blob = TextFormat::from_path(input).parse(&text)?;

        if let Some(expected) = self.config.parser_hash(&name) {
            if expected != blob.parser_hash {
                tracing::warn!(
                    table = %name,
                    "parser hash {:#010x} differs from configured {:#010x}",
                    blob.parser_hash,
                    expected
                );
            }
        }

        let data = blob
            .encode(&self.codec, root)
            .with_context(|| format!("Failed to encode {} as '{}'", input.display(), name))?;
        write_output(output, &data)?;
        tracing::debug!(records = blob.records.len(), "encoded {}", input.display());
        Ok(())
    }

    pub fn convert(&self, mode: Mode, input: &Path, output: Option<&Path>) -> Result<()> {
        match mode {
            Mode::Decode => self.decode(input, output),
            Mode::Encode => self.encode(input, output),
        }
    }

    /// Convert every matching file under `input` into `output`, keeping
    /// relative paths. Returns the files that failed.
    pub fn convert_dir(
        &self,
        mode: Mode,
        input: &Path,
        output: &Path,
    ) -> Result<Vec<(PathBuf, anyhow::Error)>> {
        let files = collect_files_with_extension(input, mode.input_extensions())?;
        tracing::info!(count = files.len(), "converting files under {}", input.display());

        let mut failures = Vec::new();
        for file in files {
            let relative = file.strip_prefix(input).unwrap_or(&file);
            let target = output.join(relative).with_extension(mode.output_extension());
            match self.convert(mode, &file, Some(&target)) {
                Ok(()) => println!("{} -> {}", file.display(), target.display()),
                Err(e) => {
                    eprintln!("Failed {}: {:#}", file.display(), e);
                    failures.push((file, e));
                }
            }
        }
        Ok(failures)
    }
}

/// Default output next to the input, with the other extension
fn default_output(mode: Mode, input: &Path) -> PathBuf {
    input.with_extension(mode.output_extension())
}

pub fn handle(args: ConvertArgs) -> Result<()> {
    let config = Config::load()?;
    let schema = load_schema(&config.schema_path(&args.schema)?)?;
    let converter = Converter::new(&schema, &config, args.table.as_deref());
    let mode = Mode::detect(args.bin2xml, args.xml2bin, &args.input);

    if args.input.is_dir() {
        let output = args.output.unwrap_or_else(|| args.input.clone());
        let failures = converter.convert_dir(mode, &args.input, &output)?;
        if !failures.is_empty() {
            bail!("{} files failed to convert", failures.len());
        }
        return Ok(());
    }

    let output = match args.output {
        Some(path) if path.as_os_str() == "-" => None,
        Some(path) => Some(path),
        None => Some(default_output(mode, &args.input)),
    };
    converter.convert(mode, &args.input, output.as_deref())?;
    if let Some(path) = &output {
        println!("{} -> {}", args.input.display(), path.display());
    }
    Ok(())
}
