//! I/O helpers for blob and structured text files

use anyhow::{Context, Result};
use blobschema::BlobFile;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Structured text encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Json,
    Yaml,
}

impl TextFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                TextFormat::Yaml
            }
            _ => TextFormat::Json,
        }
    }

    pub fn render(self, blob: &BlobFile) -> Result<String> {
        match self {
            TextFormat::Json => serde_json::to_string_pretty(blob).context("Failed to serialize JSON"),
            TextFormat::Yaml => serde_yaml::to_string(blob).context("Failed to serialize YAML"),
        }
    }

    pub fn parse(self, text: &str) -> Result<BlobFile> {
        match self {
            TextFormat::Json => serde_json::from_str(text).context("Failed to parse JSON"),
            TextFormat::Yaml => serde_yaml::from_str(text).context("Failed to parse YAML"),
        }
    }
}

/// Read a whole file
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write bytes to a file path or stdout if path is None
pub fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(p, data).with_context(|| format!("Failed to write {}", p.display()))
        }
        None => io::stdout()
            .write_all(data)
            .context("Failed to write to stdout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobschema::{FileEntry, Node};

    fn sample() -> BlobFile {
        BlobFile {
            parser_hash: 0xAABBCCDD,
            files: vec![FileEntry {
                name: "data/items.def".to_string(),
                timestamp: 7,
            }],
            dependencies: Vec::new(),
            records: vec![Node::new("Item").with_child(Node::text("Foo", "42"))],
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TextFormat::from_path(Path::new("a.yaml")), TextFormat::Yaml);
        assert_eq!(TextFormat::from_path(Path::new("a.YML")), TextFormat::Yaml);
        assert_eq!(TextFormat::from_path(Path::new("a.json")), TextFormat::Json);
        assert_eq!(TextFormat::from_path(Path::new("a")), TextFormat::Json);
    }

    #[test]
    fn test_render_and_parse() {
        for format in [TextFormat::Json, TextFormat::Yaml] {
            let text = format.render(&sample()).unwrap();
            assert_eq!(format.parse(&text).unwrap(), sample());
        }
    }

    #[test]
    fn test_write_output_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("out.bin");
        write_output(Some(&path), &[1, 2, 3]).unwrap();
        assert_eq!(read_input(&path).unwrap(), vec![1, 2, 3]);
    }
}
