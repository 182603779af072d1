//! Readable address spaces: a live process, or an in-memory image in tests

mod mock;
mod process;
mod region;
mod traits;

pub use process::{find_process, RemoteProcess};
pub use region::{readable_spans, MemoryRegion};
pub use traits::{MemorySource, PointerWidth, StringEncoding, MAX_STRING_BYTES};

#[cfg(test)]
pub use mock::MockMemorySource;
