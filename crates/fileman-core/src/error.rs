//! Error and warning types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors. A scan that returns one of these produces no snapshot.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root path does not exist.
    #[error("Scan root not found: {}", path.display())]
    RootNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root exists but cannot be traversed as a directory.
    #[error("Scan root is not a directory: {}", path.display())]
    RootNotADirectory { path: PathBuf },

    /// Root cannot be stat'ed or listed.
    #[error("Permission denied on scan root: {}", path.display())]
    RootPermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure on the root.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exclude pattern failed to compile.
    #[error("Invalid exclude pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ScanError {
    /// Classify an I/O error raised while opening the scan root.
    pub fn root_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::RootPermissionDenied { path, source },
            std::io::ErrorKind::NotFound => Self::RootNotFound { path, source },
            std::io::ErrorKind::NotADirectory => Self::RootNotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    /// Path the error refers to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::RootNotFound { path, .. }
            | Self::RootNotADirectory { path }
            | Self::RootPermissionDenied { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::InvalidPattern { .. } => None,
        }
    }
}

/// Errors loading scan options from a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Entry vanished between listing and stat.
    NotFound,
    /// Symbolic link target does not exist (only when following).
    BrokenSymlink,
    /// Error listing a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Link back to one of the directory's own ancestors.
    SymlinkCycle,
    /// Scan stopped early on request.
    Cancelled,
}

/// Non-fatal problem that dropped an entry or a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Relpath where the warning occurred.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Warning for a failed stat call.
    pub fn metadata(path: impl Into<String>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            std::io::ErrorKind::NotFound => WarningKind::NotFound,
            _ => WarningKind::MetadataError,
        };
        Self::new(path, format!("Metadata error: {error}"), kind)
    }

    /// Warning for a failed directory listing.
    pub fn read_dir(path: impl Into<String>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            std::io::ErrorKind::NotFound => WarningKind::NotFound,
            _ => WarningKind::ReadError,
        };
        Self::new(path, format!("Read error: {error}"), kind)
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<String>, target: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {path} -> {target}"),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a symlink cycle warning.
    pub fn symlink_cycle(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            message: format!("Link loops back to an ancestor, not descending: {path}"),
            path,
            kind: WarningKind::SymlinkCycle,
        }
    }

    /// Create a cancellation warning.
    pub fn cancelled() -> Self {
        Self::new(".", "Scan cancelled; snapshot is partial", WarningKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_root_io_classification() {
        let err = ScanError::root_io("/test/path", Error::new(ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(err, ScanError::RootPermissionDenied { .. }));

        let err = ScanError::root_io("/test/path", Error::new(ErrorKind::NotFound, "gone"));
        assert!(matches!(err, ScanError::RootNotFound { .. }));

        let err = ScanError::root_io("/test/path", Error::other("boom"));
        assert!(matches!(err, ScanError::Io { .. }));
        assert_eq!(err.path().unwrap(), std::path::Path::new("/test/path"));
    }

    #[test]
    fn test_warning_kind_from_io() {
        let warning = ScanWarning::metadata("a/b", &Error::new(ErrorKind::PermissionDenied, "x"));
        assert_eq!(warning.kind, WarningKind::PermissionDenied);

        let warning = ScanWarning::read_dir("a", &Error::other("x"));
        assert_eq!(warning.kind, WarningKind::ReadError);
        assert!(warning.message.contains("Read error"));
    }

    #[test]
    fn test_warning_kind_serializes_snake_case() {
        let json = serde_json::to_string(&WarningKind::SymlinkCycle).unwrap();
        assert_eq!(json, "\"symlink_cycle\"");
    }
}
