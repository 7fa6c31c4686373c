//! Filesystem access used by the scanner.
//!
//! Every read goes through [`FileSystem`] so that callers can wrap the real
//! filesystem (for example to inject permission errors in tests).

use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use fileman_core::EntryMeta;

/// File type as seen by a stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, devices.
    Other,
}

/// Normalized stat result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: StatKind,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime_ns: i64,
    pub inode: u64,
    pub dev: u64,
}

impl Stat {
    /// Build entry metadata for this stat.
    pub fn to_meta(&self, name: impl Into<CompactString>, relpath: impl Into<String>) -> EntryMeta {
        EntryMeta {
            name: name.into(),
            relpath: relpath.into(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            mtime_ns: self.mtime_ns,
            inode: self.inode,
            dev: self.dev,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == StatKind::Directory
    }
}

impl From<&std::fs::Metadata> for Stat {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            StatKind::Symlink
        } else if file_type.is_dir() {
            StatKind::Directory
        } else if file_type.is_file() {
            StatKind::File
        } else {
            StatKind::Other
        };

        Self {
            kind,
            size: metadata.len(),
            mode: get_mode(metadata, kind),
            uid: get_uid(metadata),
            gid: get_gid(metadata),
            mtime_ns: get_mtime_ns(metadata),
            inode: get_ino(metadata),
            dev: get_dev(metadata),
        }
    }
}

/// One name returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// File name, lossily converted to UTF-8.
    pub name: String,
    /// Full path (parent joined with name).
    pub path: PathBuf,
}

/// Read-only filesystem operations needed by a scan.
pub trait FileSystem: Send + Sync {
    /// List the immediate children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirListing>>;

    /// Stat without following a final symlink.
    fn symlink_metadata(&self, path: &Path) -> io::Result<Stat>;

    /// Stat following symlinks.
    fn metadata(&self, path: &Path) -> io::Result<Stat>;

    /// Read the raw target of a symlink.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Name of the user with `uid`, if it has one.
    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }

    /// Name of the group with `gid`, if it has one.
    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirListing>> {
        let mut listing = Vec::new();
        for entry in std::fs::read_dir(path)? {
            match entry {
                Ok(entry) => listing.push(DirListing {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                }),
                Err(err) => {
                    tracing::debug!(dir = %path.display(), error = %err, "skipping unreadable directory entry");
                }
            }
        }
        Ok(listing)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Stat> {
        std::fs::symlink_metadata(path).map(|m| Stat::from(&m))
    }

    fn metadata(&self, path: &Path) -> io::Result<Stat> {
        std::fs::metadata(path).map(|m| Stat::from(&m))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    #[cfg(unix)]
    fn user_name(&self, uid: u32) -> Option<String> {
        uzers::get_user_by_uid(uid).map(|u| u.name().to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    fn group_name(&self, gid: u32) -> Option<String> {
        uzers::get_group_by_gid(gid).map(|g| g.name().to_string_lossy().into_owned())
    }
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn get_mode(metadata: &std::fs::Metadata, _kind: StatKind) -> u32 {
    metadata.mode()
}

#[cfg(not(unix))]
fn get_mode(metadata: &std::fs::Metadata, kind: StatKind) -> u32 {
    // Synthesize a POSIX-like mode from the file type and read-only flag
    match kind {
        StatKind::Directory => 0o040_755,
        StatKind::Symlink => 0o120_777,
        _ if metadata.permissions().readonly() => 0o100_444,
        _ => 0o100_644,
    }
}

#[cfg(unix)]
fn get_uid(metadata: &std::fs::Metadata) -> u32 {
    metadata.uid()
}

#[cfg(not(unix))]
fn get_uid(_metadata: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn get_gid(metadata: &std::fs::Metadata) -> u32 {
    metadata.gid()
}

#[cfg(not(unix))]
fn get_gid(_metadata: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn get_mtime_ns(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .mtime()
        .saturating_mul(1_000_000_000)
        .saturating_add(metadata.mtime_nsec())
}

#[cfg(not(unix))]
fn get_mtime_ns(metadata: &std::fs::Metadata) -> i64 {
    let Ok(modified) = metadata.modified() else {
        return 0;
    };
    match modified.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// Get the inode number from metadata.
#[cfg(unix)]
fn get_ino(metadata: &std::fs::Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &std::fs::Metadata) -> u64 {
    0 // Windows doesn't have inodes
}

/// Get the device ID from metadata.
#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0
}
