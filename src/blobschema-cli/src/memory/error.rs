//! Remote memory access errors

use super::source::StringEncoding;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("Failed to read {requested} bytes at {address:#x}: {reason}")]
    Access {
        address: usize,
        requested: usize,
        reason: String,
    },

    #[error("Failed to write {size} bytes at {address:#x}: {reason}")]
    Write {
        address: usize,
        size: usize,
        reason: String,
    },

    #[error("Stash table at {address:#x} claims {count} entries in {allocated} slots")]
    CorruptStash {
        address: usize,
        count: u32,
        allocated: u32,
    },

    #[error("Process handle has already been closed")]
    Disposed,

    #[error("No process has been opened")]
    NotOpened,

    #[error("No terminator within {limit} bytes of string at {address:#x}")]
    StringTooLong { address: usize, limit: usize },

    #[error("Invalid {encoding:?} string at {address:#x}")]
    InvalidString {
        address: usize,
        encoding: StringEncoding,
    },
}

pub type Result<T> = std::result::Result<T, MemoryError>;
