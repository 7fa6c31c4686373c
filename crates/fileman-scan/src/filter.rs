//! Exclude-pattern matching.

use globset::{Glob, GlobSet, GlobSetBuilder};

use fileman_core::ScanError;

/// Compiled exclude patterns.
///
/// A pattern starting with `/` is anchored at the scan root and only
/// matches relpaths. Any other pattern matches either the bare entry name
/// or its relpath.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    unanchored: GlobSet,
    anchored: GlobSet,
}

impl ExcludeFilter {
    /// Compile a list of glob patterns.
    pub fn new(patterns: &[String]) -> Result<Self, ScanError> {
        let mut unanchored = GlobSetBuilder::new();
        let mut anchored = GlobSetBuilder::new();

        for pattern in patterns {
            let trimmed = pattern.trim().trim_end_matches('/');
            let (builder, text) = match trimmed.strip_prefix('/') {
                Some(rest) => (&mut anchored, rest),
                None => (&mut unanchored, trimmed),
            };
            let glob = Glob::new(text).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| ScanError::InvalidPattern {
                pattern: patterns.join(", "),
                message: e.to_string(),
            })
        };

        Ok(Self {
            unanchored: build(unanchored)?,
            anchored: build(anchored)?,
        })
    }

    /// A filter that excludes nothing.
    pub fn empty() -> Self {
        Self {
            unanchored: GlobSet::empty(),
            anchored: GlobSet::empty(),
        }
    }

    /// Check whether an entry should be excluded (and, if a directory, pruned).
    pub fn is_excluded(&self, name: &str, relpath: &str) -> bool {
        self.anchored.is_match(relpath)
            || self.unanchored.is_match(name)
            || self.unanchored.is_match(relpath)
    }

    /// Check if no patterns were given.
    pub fn is_empty(&self) -> bool {
        self.anchored.is_empty() && self.unanchored.is_empty()
    }
}

impl Default for ExcludeFilter {
    fn default() -> Self {
        Self::empty()
    }
}
