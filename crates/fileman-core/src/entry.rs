//! Filesystem entry types.

use std::fmt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// File type bits of `st_mode`.
const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;

/// Attributes shared by every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Entry name (not full path). The scan root is named `.`.
    pub name: CompactString,
    /// Path relative to the scan root, `/`-separated.
    pub relpath: String,
    /// Raw `st_mode`.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    pub inode: u64,
    pub dev: u64,
}

impl EntryMeta {
    /// Permission string such as `drwxr-xr-x`.
    pub fn permissions(&self) -> String {
        format_mode(self.mode)
    }

    /// Modification time as a UTC timestamp.
    pub fn modified(&self) -> DateTime<Utc> {
        let secs = self.mtime_ns.div_euclid(1_000_000_000);
        let nanos = self.mtime_ns.rem_euclid(1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }
}

/// Regular file (or any non-directory, non-symlink node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    /// Size in bytes.
    pub size: u64,
    /// Text after the last `.` of the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<CompactString>,
}

impl FileEntry {
    /// Create a file entry, deriving the extension from the name.
    pub fn new(meta: EntryMeta, size: u64) -> Self {
        let extension = extension_of(&meta.name);
        Self {
            meta,
            size,
            extension,
        }
    }
}

/// Directory and its captured children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub children: Vec<Entry>,
}

impl DirectoryEntry {
    /// Create a directory entry with no children.
    pub fn new(meta: EntryMeta) -> Self {
        Self {
            meta,
            children: Vec::new(),
        }
    }
}

/// Symbolic link, recorded without resolving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    /// Raw link text; empty if it could not be read.
    pub target: String,
}

/// Kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
        })
    }
}

/// A single captured filesystem node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entry {
    #[serde(rename = "file")]
    File(FileEntry),
    #[serde(rename = "dir")]
    Directory(DirectoryEntry),
    #[serde(rename = "symlink")]
    Symlink(SymlinkEntry),
}

impl Entry {
    /// Shared attributes.
    pub fn meta(&self) -> &EntryMeta {
        match self {
            Entry::File(f) => &f.meta,
            Entry::Directory(d) => &d.meta,
            Entry::Symlink(s) => &s.meta,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Directory(_) => EntryKind::Directory,
            Entry::Symlink(_) => EntryKind::Symlink,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn relpath(&self) -> &str {
        &self.meta().relpath
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, Entry::Symlink(_))
    }

    /// File size, `None` for directories and symlinks.
    pub fn size(&self) -> Option<u64> {
        match self {
            Entry::File(f) => Some(f.size),
            _ => None,
        }
    }

    /// Direct children (empty for non-directories).
    pub fn children(&self) -> &[Entry] {
        match self {
            Entry::Directory(d) => &d.children,
            _ => &[],
        }
    }

    /// Depth-first iterator over this entry and all descendants.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Find a descendant (or self) by relpath.
    pub fn find(&self, relpath: &str) -> Option<&Entry> {
        self.iter().find(|e| e.relpath() == relpath)
    }

    /// Sort children by name, recursively.
    pub fn sort_children_by_name(&mut self) {
        if let Entry::Directory(dir) = self {
            dir.children.sort_by(|a, b| a.name().cmp(b.name()));
            for child in &mut dir.children {
                child.sort_children_by_name();
            }
        }
    }
}

/// Depth-first entry iterator.
pub struct Iter<'a> {
    stack: Vec<&'a Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.stack.pop()?;
        self.stack.extend(entry.children().iter().rev());
        Some(entry)
    }
}

/// Extension of a file name: the text after the last `.`, when that dot is
/// neither the first nor the last character.
pub fn extension_of(name: &str) -> Option<CompactString> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(CompactString::new(ext))
}

/// Render `st_mode` as a 10-character permission string.
pub fn format_mode(mode: u32) -> String {
    let type_char = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(type_char);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
