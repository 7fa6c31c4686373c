//! Directory scanning engine for fileman.
//!
//! # Overview
//!
//! `fileman-scan` walks a directory tree and turns it into a
//! [`Snapshot`], a [`FlatSnapshot`] or a stream of entries. Key features:
//!
//! - **Pre-stat pruning**: hidden and excluded names are dropped from the
//!   directory listing before anything is stat'ed
//! - **Sequential or parallel** traversal (rayon)
//! - **Progress updates** via broadcast channels
//! - **Cancellation** via [`CancellationToken`], yielding a partial snapshot
//! - **Symlink cycle detection** when following links
//!
//! # Example
//!
//! ```rust,no_run
//! use fileman_scan::{ScanOptions, Scanner};
//!
//! let scanner = Scanner::new();
//! let snapshot = scanner.scan("/path/to/scan", &ScanOptions::new()).unwrap();
//!
//! let stats = snapshot.stats();
//! println!("Total size: {} bytes", stats.total_size);
//! println!("Total files: {}", stats.total_files);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use fileman_scan::{ScanOptions, Scanner};
//!
//! let scanner = Scanner::new();
//! let mut progress_rx = scanner.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         eprintln!("Scanned {} entries", progress.total_items());
//!     }
//! });
//!
//! let _snapshot = scanner.scan(".", &ScanOptions::new());
//! ```

mod export;
mod filter;
mod fs;
mod inode;
mod owner;
mod parallel;
mod progress;
mod scanner;
mod walk;

pub use export::{
    ExportError, OutputFormat, StreamSummary, export, write_flat, write_snapshot, write_stream,
};
pub use filter::ExcludeFilter;
pub use fs::{DirListing, FileSystem, OsFileSystem, Stat, StatKind};
pub use inode::{Ancestors, DirKey};
pub use owner::OwnerNames;
pub use progress::ScanProgress;
pub use scanner::Scanner;
pub use walk::{Walk, WalkEntry};

pub use tokio_util::sync::CancellationToken;

// Re-export core types for convenience
pub use fileman_core::{
    DEFAULT_EXCLUDES, DirectoryEntry, Entry, EntryKind, EntryMeta, FileEntry, FlatEntry,
    FlatSnapshot, SNAPSHOT_SCHEMA, ScanError, ScanOptions, ScanOptionsBuilder, ScanWarning,
    Snapshot, SnapshotHeader, SnapshotStats, SymlinkEntry, WarningKind,
};
