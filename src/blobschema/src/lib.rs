//! Schema-driven codec for compiled parse-table blobs
//!
//! Compiled resource files ("blobs") are flat little-endian streams whose
//! layout is only known through a parse schema: an ordered list of columns,
//! each naming a token type, storage flags and up to two parameters.
//!
//! # Format Overview
//!
//! ## Blob container
//!
//! - `u32` parser hash (schema fingerprint)
//! - `u32` file count, then `(string name, u32 timestamp)` per file
//! - `u32` dependency count, then `(u32 type, string name, u32 hash)`
//! - `u32` record count, then records encoded with the root table
//!
//! Strings are a `u16` byte length followed by UTF-8 data.
//!
//! ## Records
//!
//! A record is the concatenation of its columns in declared order. Array
//! columns are either a fixed number of elements (no prefix) or a `u32`
//! count followed by elements. Optional (indirect) values carry a `u32`
//! presence flag. Consecutive bit columns share a packed accumulator.

mod bits;
mod blob;
mod codec;
mod cursor;
mod flags;
mod format;
pub mod format_string;
mod multival;
mod node;
mod schema;
mod schema_file;
mod token;

pub use bits::{
    field_end, field_max, read_bits, write_bits, BitRunReader, BitRunWriter, MAX_BIT_WIDTH,
    MAX_RUN_BITS,
};
pub use blob::{BlobFile, Dependency, FileEntry};
pub use codec::{RecordCodec, MAX_ARRAY_ELEMENTS, MAX_DEPTH};
pub use cursor::{ByteReader, ByteWriter};
pub use flags::{ColumnFlags, StorageMode};
pub use format::Format;
pub use format_string::{FormatStringError, FormatStrings};
pub use multival::{opcode_by_mnemonic, opcode_by_name, Opcode, Operand};
pub use node::Node;
pub use schema::{
    resolve_aliases, AliasWarning, Column, EnumEntry, EnumValue, EnumValueType, Enumeration,
    Parameter, Schema, SubtableRef, Table, TableId,
};
pub use schema_file::{ColumnDef, SchemaFile, SubtableDef, TableDef};
pub use token::{ParameterKind, Token};

/// Errors from schema handling and blob encoding/decoding
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unexpected end of data: need {needed} bytes at offset {offset}, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Parser hash mismatch: expected {expected:#010x}, got {actual:#010x} (unknown schema version)")]
    HashMismatch { expected: u32, actual: u32 },

    #[error("Invalid token id {0}")]
    InvalidToken(u8),

    #[error("Unknown token type name '{0}'")]
    UnknownTypeName(String),

    #[error("Unknown multi-value opcode {0:?}")]
    UnknownOpcode(String),

    #[error("Column '{column}': {token} does not support {storage:?} storage")]
    UnsupportedStorage {
        column: String,
        token: &'static str,
        storage: StorageMode,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Polymorph index {index} out of range for '{column}' ({count} variants)")]
    PolymorphIndex {
        column: String,
        index: i32,
        count: usize,
    },

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{column}': {value:?}")]
    InvalidValue { column: String, value: String },

    #[error("Array length mismatch for '{column}': expected {expected}, got {actual}")]
    ArrayLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Array of '{column}' declares {count} elements")]
    ArrayTooLarge { column: String, count: u32 },

    #[error("String too long: {0} bytes")]
    StringTooLong(usize),

    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidString(usize),

    #[error("Trailing data: {0} bytes after last record")]
    TrailingData(usize),

    #[error("Record nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::HashMismatch {
            expected: 0xAABBCCDD,
            actual: 0x11223344,
        };
        assert!(err.to_string().contains("0xaabbccdd"));
        assert!(err.to_string().contains("unknown schema version"));

        let err = Error::InvalidToken(13);
        assert!(err.to_string().contains("Invalid token id 13"));

        let err = Error::UnknownOpcode("ZZZZ".to_string());
        assert!(err.to_string().contains("Unknown multi-value opcode"));

        let err = Error::UnexpectedEof {
            offset: 4,
            needed: 4,
            available: 2,
        };
        assert!(err.to_string().contains("Unexpected end of data"));

        let err = Error::UnsupportedStorage {
            column: "Foo".to_string(),
            token: "Bit",
            storage: StorageMode::IndirectArray,
        };
        assert!(err.to_string().contains("Foo"));
        assert!(err.to_string().contains("IndirectArray"));
    }
}
