//! Target process memory access
//!
//! - `source`: the `MemorySource` trait, live process and mock sources
//! - `pattern`: wildcard byte patterns and block scanning
//! - `binary`: main module and pointer width detection
//! - `layout`: 32/64-bit native structures
//! - `stash`: stash table reader
//! - `suspend`: scoped process suspension

pub mod binary;
pub mod error;
pub mod layout;
pub mod pattern;
pub mod source;
pub mod stash;
pub mod suspend;

pub use error::MemoryError;
