//! JSON writers for snapshots.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use fileman_core::{
    Entry, EntryMeta, FileEntry, FlatSnapshot, ScanError, ScanOptions, Snapshot, SnapshotHeader,
    SymlinkEntry,
};

use crate::fs::FileSystem;
use crate::scanner::Scanner;

/// Errors that can occur while producing output.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The scan itself failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Indented tree document.
    Pretty,
    /// Single-line tree document.
    #[default]
    Compact,
    /// One header line, then one line per entry.
    Stream,
    /// Flat list of entries.
    Flat,
}

/// Counts reported by [`write_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    /// Entry lines written, root included.
    pub entries: u64,
    /// Warnings collected during the walk.
    pub warnings: usize,
}

/// One line of stream output, tagged by `record`.
#[derive(Serialize)]
#[serde(tag = "record", rename_all = "lowercase")]
enum StreamRecord<'a> {
    Header(&'a SnapshotHeader),
    Entry(StreamEntry<'a>),
}

/// An entry without its children.
#[derive(Serialize)]
#[serde(tag = "type")]
enum StreamEntry<'a> {
    #[serde(rename = "file")]
    File(&'a FileEntry),
    #[serde(rename = "dir")]
    Directory(&'a EntryMeta),
    #[serde(rename = "symlink")]
    Symlink(&'a SymlinkEntry),
}

impl<'a> From<&'a Entry> for StreamEntry<'a> {
    fn from(entry: &'a Entry) -> Self {
        match entry {
            Entry::File(f) => StreamEntry::File(f),
            Entry::Directory(d) => StreamEntry::Directory(&d.meta),
            Entry::Symlink(s) => StreamEntry::Symlink(s),
        }
    }
}

/// Write a tree-mode snapshot followed by a newline.
pub fn write_snapshot<W: Write>(snapshot: &Snapshot, pretty: bool, mut out: W) -> Result<(), ExportError> {
    if pretty {
        serde_json::to_writer_pretty(&mut out, snapshot)?;
    } else {
        serde_json::to_writer(&mut out, snapshot)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Write a flat-mode snapshot followed by a newline.
pub fn write_flat<W: Write>(flat: &FlatSnapshot, pretty: bool, mut out: W) -> Result<(), ExportError> {
    if pretty {
        serde_json::to_writer_pretty(&mut out, flat)?;
    } else {
        serde_json::to_writer(&mut out, flat)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Scan `root` and write it as JSON lines.
///
/// The first line is a [`SnapshotHeader`] tagged `"record": "header"`;
/// every following line is one entry in discovery order, tagged
/// `"record": "entry"`, with no `children` key. Warnings are logged and
/// counted, not written.
pub fn write_stream<F: FileSystem, W: Write>(
    scanner: &Scanner<F>,
    root: impl AsRef<Path>,
    options: &ScanOptions,
    mut out: W,
) -> Result<StreamSummary, ExportError> {
    let root = root.as_ref();
    let mut entries = 0u64;

    // The root is always yielded first, so a bad root writes nothing.
    let warnings = scanner.stream(root, options, |item| -> Result<(), ExportError> {
        if item.id == 0 {
            let header = SnapshotHeader::new(root.to_string_lossy(), options.clone());
            serde_json::to_writer(&mut out, &StreamRecord::Header(&header))?;
            writeln!(out)?;
        }
        serde_json::to_writer(&mut out, &StreamRecord::Entry(StreamEntry::from(&item.entry)))?;
        writeln!(out)?;
        entries += 1;
        Ok(())
    })?;

    for warning in &warnings {
        tracing::warn!(path = %warning.path, kind = ?warning.kind, "{}", warning.message);
    }

    out.flush()?;
    Ok(StreamSummary {
        entries,
        warnings: warnings.len(),
    })
}

/// Run a scan in the requested layout and write it to `out`.
pub fn export<F: FileSystem, W: Write>(
    scanner: &Scanner<F>,
    root: impl AsRef<Path>,
    options: &ScanOptions,
    format: OutputFormat,
    out: W,
) -> Result<StreamSummary, ExportError> {
    let root = root.as_ref();
    match format {
        OutputFormat::Stream => write_stream(scanner, root, options, out),
        OutputFormat::Flat => {
            let flat = scanner.scan_flat(root, options)?;
            write_flat(&flat, false, out)?;
            Ok(StreamSummary {
                entries: flat.entries.len() as u64,
                warnings: flat.warnings.len(),
            })
        }
        OutputFormat::Pretty | OutputFormat::Compact => {
            let snapshot = scanner.scan(root, options)?;
            write_snapshot(&snapshot, format == OutputFormat::Pretty, out)?;
            Ok(StreamSummary {
                entries: snapshot.entry_count() as u64,
                warnings: snapshot.warnings.len(),
            })
        }
    }
}
