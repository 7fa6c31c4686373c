//! Snapshot containers and statistics.

use chrono::{DateTime, Utc};
use compact_str::{CompactString, ToCompactString};
use serde::{Deserialize, Serialize};

use crate::config::ScanOptions;
use crate::entry::{Entry, EntryKind};
use crate::error::ScanWarning;

/// Schema tag written at the top of every snapshot.
pub const SNAPSHOT_SCHEMA: &str = "fileman.snapshot.v1";

/// Summary statistics for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Total size of all files in bytes.
    pub total_size: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories, root included.
    pub total_dirs: u64,
    /// Total number of symbolic links.
    pub total_symlinks: u64,
    /// Deepest relpath depth seen (root = 0).
    pub max_depth: u32,
}

impl SnapshotStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with one entry found at `depth`.
    pub fn record(&mut self, entry: &Entry, depth: u32) {
        self.max_depth = self.max_depth.max(depth);
        match entry {
            Entry::File(f) => {
                self.total_files += 1;
                self.total_size += f.size;
            }
            Entry::Directory(_) => self.total_dirs += 1,
            Entry::Symlink(_) => self.total_symlinks += 1,
        }
    }

    /// Total number of entries recorded.
    pub fn total_entries(&self) -> u64 {
        self.total_files + self.total_dirs + self.total_symlinks
    }
}

/// Leading metadata of a snapshot. Streaming output writes this as its
/// first line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub schema: String,
    pub generated_at: DateTime<Utc>,
    pub root: String,
    pub options: ScanOptions,
}

impl SnapshotHeader {
    /// Header stamped with the current time.
    pub fn new(root: impl Into<String>, options: ScanOptions) -> Self {
        Self {
            schema: SNAPSHOT_SCHEMA.to_string(),
            generated_at: Utc::now(),
            root: root.into(),
            options,
        }
    }
}

/// Complete output of one tree-mode scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema: String,
    pub generated_at: DateTime<Utc>,
    /// Root path as supplied to the scan.
    pub root: String,
    pub options: ScanOptions,
    /// Root directory entry.
    pub tree: Entry,
    /// Entries and subtrees dropped during the scan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl Snapshot {
    /// Create a new snapshot stamped with the current time.
    pub fn new(
        root: impl Into<String>,
        options: ScanOptions,
        tree: Entry,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let header = SnapshotHeader::new(root, options);
        Self {
            schema: header.schema,
            generated_at: header.generated_at,
            root: header.root,
            options: header.options,
            tree,
            warnings,
        }
    }

    /// Header fields of this snapshot.
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader {
            schema: self.schema.clone(),
            generated_at: self.generated_at,
            root: self.root.clone(),
            options: self.options.clone(),
        }
    }

    /// Total number of entries in the tree, root included.
    pub fn entry_count(&self) -> usize {
        self.tree.iter().count()
    }

    /// Look up an entry by relpath.
    pub fn find(&self, relpath: &str) -> Option<&Entry> {
        self.tree.find(relpath)
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Compute summary statistics over the tree.
    pub fn stats(&self) -> SnapshotStats {
        let mut stats = SnapshotStats::new();
        let mut stack = vec![(&self.tree, 0u32)];
        while let Some((entry, depth)) = stack.pop() {
            stats.record(entry, depth);
            stack.extend(entry.children().iter().map(|c| (c, depth + 1)));
        }
        stats
    }

    /// Flatten the tree into the flat schema. The root is not listed and
    /// entries are ordered by path.
    pub fn to_flat(&self) -> FlatSnapshot {
        let mut flat = FlatSnapshot {
            root: self.root.clone(),
            scanned_at: self.generated_at,
            entries: self.tree.iter().skip(1).map(FlatEntry::from).collect(),
            warnings: self.warnings.clone(),
        };
        flat.sort_by_path();
        flat
    }
}

/// One record of the flat schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEntry {
    /// Relpath of the entry.
    pub path: String,
    pub name: CompactString,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// File size in bytes (0 for directories and symlinks).
    pub size: u64,
    /// Permission string such as `-rw-r--r--`.
    pub permissions: String,
    pub modified: DateTime<Utc>,
    pub uid: u32,
    pub gid: u32,
    /// Owner name, or the numeric uid when it has no name.
    pub user: CompactString,
    /// Group name, or the numeric gid when it has no name.
    pub group: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl From<&Entry> for FlatEntry {
    fn from(entry: &Entry) -> Self {
        let meta = entry.meta();
        let (size, extension, target) = match entry {
            Entry::File(f) => (f.size, f.extension.clone(), None),
            Entry::Directory(_) => (0, None, None),
            Entry::Symlink(s) => (0, None, Some(s.target.clone())),
        };
        Self {
            path: meta.relpath.clone(),
            name: meta.name.clone(),
            kind: entry.kind(),
            size,
            permissions: meta.permissions(),
            modified: meta.modified(),
            uid: meta.uid,
            gid: meta.gid,
            user: meta.uid.to_compact_string(),
            group: meta.gid.to_compact_string(),
            extension,
            target,
        }
    }
}

/// Output of a flat-mode scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSnapshot {
    pub root: String,
    pub scanned_at: DateTime<Utc>,
    pub entries: Vec<FlatEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl FlatSnapshot {
    /// Create an empty flat snapshot stamped with the current time.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            scanned_at: Utc::now(),
            entries: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Order entries by path, byte-wise.
    pub fn sort_by_path(&mut self) {
        self.entries.sort_unstable_by(|a, b| a.path.cmp(&b.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DirectoryEntry, EntryMeta, FileEntry, SymlinkEntry};

    fn meta(name: &str, relpath: &str, mode: u32) -> EntryMeta {
        EntryMeta {
            name: name.into(),
            relpath: relpath.to_string(),
            mode,
            uid: 0,
            gid: 0,
            mtime_ns: 0,
            inode: 0,
            dev: 0,
        }
    }

    fn sample_tree() -> Entry {
        let mut sub = DirectoryEntry::new(meta("sub", "sub", 0o040_755));
        sub.children.push(Entry::File(FileEntry::new(
            meta("b.rs", "sub/b.rs", 0o100_644),
            10,
        )));
        let mut root = DirectoryEntry::new(meta(".", ".", 0o040_755));
        root.children.push(Entry::File(FileEntry::new(
            meta("a.txt", "a.txt", 0o100_644),
            5,
        )));
        root.children.push(Entry::Directory(sub));
        root.children.push(Entry::Symlink(SymlinkEntry {
            meta: meta("link", "link", 0o120_777),
            target: "a.txt".to_string(),
        }));
        Entry::Directory(root)
    }

    #[test]
    fn test_stats() {
        let snapshot = Snapshot::new("/tmp/x", ScanOptions::new(), sample_tree(), Vec::new());
        let stats = snapshot.stats();

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_dirs, 2);
        assert_eq!(stats.total_symlinks, 1);
        assert_eq!(stats.total_size, 15);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.total_entries(), snapshot.entry_count() as u64);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot::new("/tmp/x", ScanOptions::new(), sample_tree(), Vec::new());
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["schema"], SNAPSHOT_SCHEMA);
        assert_eq!(value["root"], "/tmp/x");
        assert_eq!(value["options"]["depth"], serde_json::Value::Null);
        assert_eq!(value["options"]["include_hidden"], false);
        assert_eq!(value["options"]["exclude"], serde_json::json!([]));
        assert!(value["options"].get("threads").is_none());
        assert_eq!(value["tree"]["type"], "dir");
        assert_eq!(value["tree"]["children"].as_array().unwrap().len(), 3);
        assert!(value.get("warnings").is_none());
    }

    #[test]
    fn test_to_flat_skips_root() {
        let snapshot = Snapshot::new("/tmp/x", ScanOptions::new(), sample_tree(), Vec::new());
        let flat = snapshot.to_flat();

        assert_eq!(flat.entries.len(), 4);
        assert!(flat.entries.iter().all(|e| e.path != "."));

        let link = flat.entries.iter().find(|e| e.name == "link").unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(link.target.as_deref(), Some("a.txt"));
        assert_eq!(link.permissions, "lrwxrwxrwx");

        let value = serde_json::to_value(&flat.entries[0]).unwrap();
        assert!(value.get("type").is_some());
    }

    #[test]
    fn test_to_flat_orders_by_path() {
        let snapshot = Snapshot::new("/tmp/x", ScanOptions::new(), sample_tree(), Vec::new());
        let paths: Vec<String> = snapshot.to_flat().entries.into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["a.txt", "link", "sub", "sub/b.rs"]);
    }

    #[test]
    fn test_owner_defaults_to_numeric_ids() {
        let mut m = meta("a.txt", "a.txt", 0o100_644);
        m.uid = 1000;
        m.gid = 50;
        let entry = FlatEntry::from(&Entry::File(FileEntry::new(m, 1)));

        assert_eq!(entry.uid, 1000);
        assert_eq!(entry.user.as_str(), "1000");
        assert_eq!(entry.group.as_str(), "50");
    }
}
