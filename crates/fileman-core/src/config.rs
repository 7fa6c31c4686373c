//! Scan option types.

use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Names the CLI excludes unless asked not to.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".jj",
    ".hg",
    ".svn",
    ".devman",
    "node_modules",
    "__pycache__",
    ".venv",
    "target",
    "dist",
    "build",
];

/// Options for a single scan.
///
/// Serializes with the field names used in the snapshot's `options` block
/// (`depth`, `exclude`); the longer names are accepted as aliases when
/// loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanOptions {
    /// Maximum depth to descend into (None = unlimited). The root is depth 0.
    #[builder(default)]
    #[serde(rename = "depth", alias = "max_depth", default)]
    pub max_depth: Option<u32>,

    /// Include entries whose name starts with `.`.
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Stat through symlinks and traverse links to directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Glob patterns matched against entry names and relpaths.
    #[builder(default)]
    #[serde(rename = "exclude", alias = "exclude_patterns", default)]
    pub exclude_patterns: Vec<String>,

    /// Worker threads (1 = sequential walk, 0 = rayon's default pool).
    #[builder(default = "1")]
    #[serde(default = "default_threads", skip_serializing)]
    pub threads: usize,
}

fn default_threads() -> usize {
    1
}

impl ScanOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref patterns) = self.exclude_patterns {
            if patterns.iter().any(|p| p.trim().is_empty()) {
                return Err("Exclude patterns cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl ScanOptions {
    /// Create a new options builder.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Options with every default: unlimited depth, no hidden entries,
    /// symlinks recorded rather than followed, nothing excluded.
    pub fn new() -> Self {
        Self {
            max_depth: None,
            include_hidden: false,
            follow_symlinks: false,
            exclude_patterns: Vec::new(),
            threads: 1,
        }
    }

    /// Parse options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        options.check()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Prepend [`DEFAULT_EXCLUDES`], keeping any user patterns after them.
    pub fn with_default_excludes(mut self) -> Self {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        for pattern in self.exclude_patterns.drain(..) {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        self.exclude_patterns = patterns;
        self
    }

    /// Check if hidden entries should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Check whether a directory at `depth` may be listed.
    pub fn may_descend(&self, depth: u32) -> bool {
        self.max_depth.is_none_or(|max| depth < max)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                message: "Exclude patterns cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = ScanOptions::builder()
            .max_depth(2u32)
            .follow_symlinks(true)
            .exclude_patterns(vec!["node_modules".to_string()])
            .build()
            .unwrap();

        assert_eq!(options.max_depth, Some(2));
        assert!(options.follow_symlinks);
        assert!(!options.include_hidden);
        assert_eq!(options.threads, 1);
    }

    #[test]
    fn test_builder_rejects_empty_pattern() {
        let result = ScanOptions::builder()
            .exclude_patterns(vec!["  ".to_string()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut options = ScanOptions::new();

        // Hidden entries are skipped by default
        assert!(options.should_skip_hidden(".git"));
        assert!(!options.should_skip_hidden("src"));

        options.include_hidden = true;
        assert!(!options.should_skip_hidden(".git"));
    }

    #[test]
    fn test_may_descend() {
        let mut options = ScanOptions::new();
        assert!(options.may_descend(1_000));

        options.max_depth = Some(0);
        assert!(!options.may_descend(0));

        options.max_depth = Some(1);
        assert!(options.may_descend(0));
        assert!(!options.may_descend(1));
    }

    #[test]
    fn test_default_excludes_prepended() {
        let options = ScanOptions {
            exclude_patterns: vec!["*.log".to_string(), "target".to_string()],
            ..ScanOptions::new()
        }
        .with_default_excludes();

        assert_eq!(options.exclude_patterns[0], ".git");
        assert_eq!(options.exclude_patterns.last().unwrap(), "*.log");
        assert_eq!(
            options.exclude_patterns.iter().filter(|p| *p == "target").count(),
            1
        );
    }

    #[test]
    fn test_from_toml_aliases() {
        let options = ScanOptions::from_toml_str(
            r#"
            max_depth = 3
            include_hidden = true
            exclude_patterns = ["dist"]
            threads = 4
            "#,
        )
        .unwrap();

        assert_eq!(options.max_depth, Some(3));
        assert!(options.include_hidden);
        assert_eq!(options.exclude_patterns, vec!["dist".to_string()]);
        assert_eq!(options.threads, 4);
    }

    #[test]
    fn test_from_toml_defaults() {
        let options = ScanOptions::from_toml_str("depth = 1").unwrap();
        assert_eq!(options.max_depth, Some(1));
        assert_eq!(options.threads, 1);
        assert!(!options.follow_symlinks);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            ScanOptions::from_toml_str("depth = \"deep\""),
            Err(ConfigError::Parse { .. })
        ));
    }
}
