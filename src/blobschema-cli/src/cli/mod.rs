//! CLI argument definitions for blobschema
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod core;

pub use core::{Cli, Commands, TargetArgs};
