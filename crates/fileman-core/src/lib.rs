//! Core types for fileman.
//!
//! This crate provides the data model shared by the scanner and the CLI:
//! entries, snapshots (tree and flat), scan options and error types.

mod config;
mod entry;
mod error;
mod snapshot;

pub use config::{DEFAULT_EXCLUDES, ScanOptions, ScanOptionsBuilder};
pub use entry::{
    DirectoryEntry, Entry, EntryKind, EntryMeta, FileEntry, Iter, SymlinkEntry, extension_of,
    format_mode,
};
pub use error::{ConfigError, ScanError, ScanWarning, WarningKind};
pub use snapshot::{
    FlatEntry, FlatSnapshot, SNAPSHOT_SCHEMA, Snapshot, SnapshotHeader, SnapshotStats,
};
