//! Blob container: header, file manifest, dependencies and records

use crate::codec::RecordCodec;
use crate::cursor::{ByteReader, ByteWriter};
use crate::node::Node;
use crate::schema::TableId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Source file a blob was compiled from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub timestamp: u32,
}

/// Dependency recorded in a blob header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub kind: u32,
    pub name: String,
    pub hash: u32,
}

/// A decoded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobFile {
    pub parser_hash: u32,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub records: Vec<Node>,
}

impl BlobFile {
    /// Parser hash of a blob without decoding the rest
    pub fn peek_parser_hash(data: &[u8]) -> Result<u32> {
        ByteReader::new(data).read_u32()
    }

    /// Decode a complete blob.
    ///
    /// When `expected_hash` is given the header hash must match it before
    /// anything else is read.
    pub fn decode(
        data: &[u8],
        codec: &RecordCodec,
        table: TableId,
        expected_hash: Option<u32>,
    ) -> Result<Self> {
        let mut reader = ByteReader::new(data);

        let parser_hash = reader.read_u32()?;
        if let Some(expected) = expected_hash {
            if expected != parser_hash {
                return Err(Error::HashMismatch {
                    expected,
                    actual: parser_hash,
                });
            }
        }

        let file_count = reader.read_u32()?;
        let mut files = Vec::new();
        for _ in 0..file_count {
            let name = reader.read_string()?;
            let timestamp = reader.read_u32()?;
            files.push(FileEntry { name, timestamp });
        }

        let dependency_count = reader.read_u32()?;
        let mut dependencies = Vec::new();
        for _ in 0..dependency_count {
            let kind = reader.read_u32()?;
            let name = reader.read_string()?;
            let hash = reader.read_u32()?;
            dependencies.push(Dependency { kind, name, hash });
        }

        let record_count = reader.read_u32()?;
        tracing::debug!(
            parser_hash = format_args!("{:#010x}", parser_hash),
            files = file_count,
            dependencies = dependency_count,
            records = record_count,
            "decoding blob"
        );

        let mut records = Vec::new();
        for _ in 0..record_count {
            records.push(codec.decode_record(table, &mut reader)?);
        }

        if !reader.is_empty() {
            return Err(Error::TrailingData(reader.remaining()));
        }

        Ok(Self {
            parser_hash,
            files,
            dependencies,
            records,
        })
    }

    /// Encode the blob back to bytes
    pub fn encode(&self, codec: &RecordCodec, table: TableId) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.parser_hash)?;

        writer.write_u32(self.files.len() as u32)?;
        for file in &self.files {
            writer.write_string(&file.name)?;
            writer.write_u32(file.timestamp)?;
        }

        writer.write_u32(self.dependencies.len() as u32)?;
        for dep in &self.dependencies {
            writer.write_u32(dep.kind)?;
            writer.write_string(&dep.name)?;
            writer.write_u32(dep.hash)?;
        }

        writer.write_u32(self.records.len() as u32)?;
        for record in &self.records {
            codec.encode_record(table, record, &mut writer)?;
        }

        Ok(writer.into_inner())
    }
}
