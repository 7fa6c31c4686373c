//! Integration tests for scanning.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use fileman_scan::{
    CancellationToken, DirListing, Entry, FileSystem, OsFileSystem, ScanError, ScanOptions,
    Scanner, Stat, WarningKind, write_stream,
};

/// Wraps the host filesystem and denies selected operations.
#[derive(Default)]
struct FaultyFs {
    deny_list: HashSet<PathBuf>,
    deny_stat: HashSet<PathBuf>,
}

impl FaultyFs {
    fn deny_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.deny_list.insert(path.into());
        self
    }

    fn deny_stat(mut self, path: impl Into<PathBuf>) -> Self {
        self.deny_stat.insert(path.into());
        self
    }

    fn denied() -> io::Error {
        io::Error::from(io::ErrorKind::PermissionDenied)
    }
}

impl FileSystem for FaultyFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirListing>> {
        if self.deny_list.contains(path) {
            return Err(Self::denied());
        }
        OsFileSystem.read_dir(path)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Stat> {
        if self.deny_stat.contains(path) {
            return Err(Self::denied());
        }
        OsFileSystem.symlink_metadata(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<Stat> {
        if self.deny_stat.contains(path) {
            return Err(Self::denied());
        }
        OsFileSystem.metadata(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        OsFileSystem.read_link(path)
    }
}

/// Lists every directory sorted by name, optionally in reverse.
struct OrderedFs {
    reverse: bool,
}

impl FileSystem for OrderedFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirListing>> {
        let mut listing = OsFileSystem.read_dir(path)?;
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        if self.reverse {
            listing.reverse();
        }
        Ok(listing)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Stat> {
        OsFileSystem.symlink_metadata(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<Stat> {
        OsFileSystem.metadata(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        OsFileSystem.read_link(path)
    }
}

/// Cancels `token` while listing `trigger`, after the listing succeeds.
struct CancellingFs {
    token: CancellationToken,
    trigger: PathBuf,
}

impl FileSystem for CancellingFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirListing>> {
        let mut listing = OsFileSystem.read_dir(path)?;
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        if path == self.trigger {
            self.token.cancel();
        }
        Ok(listing)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Stat> {
        OsFileSystem.symlink_metadata(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<Stat> {
        OsFileSystem.metadata(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        OsFileSystem.read_link(path)
    }
}

fn create_test_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("README.md"), "readme").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("src/nested/lib.rs"), "").unwrap();
    fs::write(root.join("docs/guide.md"), "# Guide\n").unwrap();

    temp
}

fn relpaths(entry: &Entry) -> Vec<String> {
    let mut paths: Vec<String> = entry.iter().map(|e| e.relpath().to_string()).collect();
    paths.sort();
    paths
}

#[test]
fn test_entry_count_matches_tree() {
    let temp = create_test_tree();
    let snapshot = Scanner::new().scan(temp.path(), &ScanOptions::new()).unwrap();

    // root, README.md, src, src/main.rs, src/nested, src/nested/lib.rs, docs, docs/guide.md
    assert_eq!(snapshot.entry_count(), 8);
    assert_eq!(snapshot.tree.relpath(), ".");
    assert_eq!(snapshot.tree.name(), ".");
    assert!(snapshot.tree.is_dir());
}

#[test]
fn test_scan_is_idempotent() {
    let temp = create_test_tree();
    let scanner = Scanner::new();
    let options = ScanOptions::new();

    let first = scanner.scan(temp.path(), &options).unwrap();
    let second = scanner.scan(temp.path(), &options).unwrap();
    assert_eq!(first.tree, second.tree);
}

#[test]
fn test_file_sizes_and_extensions() {
    let temp = create_test_tree();
    let snapshot = Scanner::new().scan(temp.path(), &ScanOptions::new()).unwrap();

    let Some(Entry::File(main)) = snapshot.find("src/main.rs") else {
        panic!("src/main.rs missing");
    };
    assert_eq!(main.size, 12);
    assert_eq!(main.extension.as_deref(), Some("rs"));

    let Some(Entry::File(lib)) = snapshot.find("src/nested/lib.rs") else {
        panic!("src/nested/lib.rs missing");
    };
    assert_eq!(lib.size, 0);
    assert_eq!(lib.meta.name.as_str(), "lib.rs");
}

#[test]
fn test_hidden_entries() {
    let temp = create_test_tree();
    fs::write(temp.path().join(".env"), "SECRET=1").unwrap();
    fs::create_dir(temp.path().join(".cache")).unwrap();
    fs::write(temp.path().join(".cache/blob"), "x").unwrap();

    let scanner = Scanner::new();
    let hidden_off = scanner.scan(temp.path(), &ScanOptions::new()).unwrap();
    assert!(hidden_off.find(".env").is_none());
    assert!(hidden_off.find(".cache").is_none());

    let options = ScanOptions::builder().include_hidden(true).build().unwrap();
    let hidden_on = scanner.scan(temp.path(), &options).unwrap();
    assert!(hidden_on.find(".env").is_some());
    assert!(hidden_on.find(".cache/blob").is_some());
}

#[test]
fn test_depth_zero_records_root_only() {
    let temp = create_test_tree();
    let options = ScanOptions::builder().max_depth(0u32).build().unwrap();
    let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

    assert_eq!(snapshot.entry_count(), 1);
    assert!(snapshot.tree.children().is_empty());
}

#[test]
fn test_depth_one_records_children_without_grandchildren() {
    let temp = create_test_tree();
    let options = ScanOptions::builder().max_depth(1u32).build().unwrap();
    let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

    assert_eq!(relpaths(&snapshot.tree), vec![".", "README.md", "docs", "src"]);
    assert!(snapshot.find("src").unwrap().children().is_empty());
}

#[test]
fn test_excluded_directory_is_pruned() {
    let temp = create_test_tree();
    fs::create_dir_all(temp.path().join("web/node_modules/pkg")).unwrap();
    fs::write(temp.path().join("web/node_modules/pkg/index.js"), "").unwrap();
    fs::write(temp.path().join("web/app.js"), "").unwrap();

    let options = ScanOptions::new().with_default_excludes();
    let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

    assert!(snapshot.find("web/app.js").is_some());
    assert!(
        snapshot
            .tree
            .iter()
            .all(|e| !e.relpath().contains("node_modules"))
    );
}

#[test]
fn test_anchored_exclude() {
    let temp = create_test_tree();
    fs::create_dir_all(temp.path().join("build")).unwrap();
    fs::create_dir_all(temp.path().join("docs/build")).unwrap();

    let options = ScanOptions::builder()
        .exclude_patterns(vec!["/build".to_string()])
        .build()
        .unwrap();
    let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

    assert!(snapshot.find("build").is_none());
    assert!(snapshot.find("docs/build").is_some());
}

#[test]
fn test_invalid_pattern_is_fatal() {
    let temp = create_test_tree();
    let options = ScanOptions::builder()
        .exclude_patterns(vec!["[unclosed".to_string()])
        .build()
        .unwrap();
    let result = Scanner::new().scan(temp.path(), &options);
    assert!(matches!(result, Err(ScanError::InvalidPattern { .. })));
}

#[test]
fn test_missing_root() {
    let temp = TempDir::new().unwrap();
    let result = Scanner::new().scan(temp.path().join("nope"), &ScanOptions::new());
    assert!(matches!(result, Err(ScanError::RootNotFound { .. })));
}

#[test]
fn test_root_is_a_file() {
    let temp = create_test_tree();
    let result = Scanner::new().scan(temp.path().join("README.md"), &ScanOptions::new());
    assert!(matches!(result, Err(ScanError::RootNotADirectory { .. })));
}

#[test]
fn test_root_listing_denied() {
    let temp = create_test_tree();
    let scanner = Scanner::with_filesystem(FaultyFs::default().deny_list(temp.path()));

    let result = scanner.scan(temp.path(), &ScanOptions::new());
    match result {
        Err(ScanError::RootPermissionDenied { path, .. }) => assert_eq!(path, temp.path()),
        other => panic!("expected RootPermissionDenied, got {other:?}"),
    }
}

#[test]
fn test_root_stat_denied() {
    let temp = create_test_tree();
    let scanner = Scanner::with_filesystem(FaultyFs::default().deny_stat(temp.path()));

    let result = scanner.scan_flat(temp.path(), &ScanOptions::new());
    assert!(matches!(result, Err(ScanError::RootPermissionDenied { .. })));
}

#[test]
fn test_unlistable_subdirectory_keeps_siblings() {
    let temp = create_test_tree();
    let scanner = Scanner::with_filesystem(FaultyFs::default().deny_list(temp.path().join("src")));

    let snapshot = scanner.scan(temp.path(), &ScanOptions::new()).unwrap();

    let src = snapshot.find("src").unwrap();
    assert!(src.is_dir());
    assert!(src.children().is_empty());
    assert!(snapshot.find("docs/guide.md").is_some());
    assert!(snapshot.find("README.md").is_some());

    assert_eq!(snapshot.warnings.len(), 1);
    assert_eq!(snapshot.warnings[0].path, "src");
    assert_eq!(snapshot.warnings[0].kind, WarningKind::PermissionDenied);
}

#[test]
fn test_unstatable_entry_is_dropped() {
    let temp = create_test_tree();
    let scanner =
        Scanner::with_filesystem(FaultyFs::default().deny_stat(temp.path().join("docs")));

    let snapshot = scanner.scan(temp.path(), &ScanOptions::new()).unwrap();

    assert!(snapshot.find("docs").is_none());
    assert!(snapshot.find("docs/guide.md").is_none());
    assert!(snapshot.find("src/nested/lib.rs").is_some());
    assert_eq!(snapshot.warnings.len(), 1);
    assert_eq!(snapshot.warnings[0].path, "docs");
}

#[test]
fn test_parallel_matches_sequential() {
    let temp = create_test_tree();
    for i in 0..20 {
        let dir = temp.path().join(format!("bulk/d{i:02}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("f.txt"), vec![b'x'; i]).unwrap();
    }

    let scanner = Scanner::new();
    let sequential = scanner.scan(temp.path(), &ScanOptions::new()).unwrap();

    for threads in [0usize, 4] {
        let options = ScanOptions::builder().threads(threads).build().unwrap();
        let parallel = scanner.scan(temp.path(), &options).unwrap();
        assert_eq!(parallel.tree, sequential.tree);
        assert_eq!(parallel.stats(), sequential.stats());
    }
}

#[test]
fn test_parallel_keeps_warnings() {
    let temp = create_test_tree();
    let scanner = Scanner::with_filesystem(
        FaultyFs::default()
            .deny_list(temp.path().join("src/nested"))
            .deny_stat(temp.path().join("README.md")),
    );
    let options = ScanOptions::builder().threads(2usize).build().unwrap();

    let snapshot = scanner.scan(temp.path(), &options).unwrap();

    let mut paths: Vec<&str> = snapshot.warnings.iter().map(|w| w.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["README.md", "src/nested"]);
    assert!(snapshot.find("src/main.rs").is_some());
}

#[test]
fn test_cancelled_before_start() {
    let temp = create_test_tree();
    let token = CancellationToken::new();
    token.cancel();

    for threads in [1usize, 2] {
        let scanner = Scanner::new().with_cancellation(token.clone());
        let options = ScanOptions::builder().threads(threads).build().unwrap();
        let snapshot = scanner.scan(temp.path(), &options).unwrap();

        assert_eq!(snapshot.entry_count(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::Cancelled);
    }
}

#[test]
fn test_cancelled_mid_scan_keeps_partial_tree() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("a/deep")).unwrap();
    fs::create_dir(temp.path().join("b")).unwrap();
    fs::write(temp.path().join("a/x"), "x").unwrap();
    fs::write(temp.path().join("a/deep/y"), "y").unwrap();
    fs::write(temp.path().join("b/z"), "z").unwrap();

    for threads in [1usize, 2] {
        let token = CancellationToken::new();
        let scanner = Scanner::with_filesystem(CancellingFs {
            token: token.clone(),
            trigger: temp.path().join("a"),
        })
        .with_cancellation(token);
        let options = ScanOptions::builder().threads(threads).build().unwrap();

        let snapshot = scanner.scan(temp.path(), &options).unwrap();

        // The listing in flight when the token fired is kept
        assert!(snapshot.find("a/x").is_some(), "threads={threads}");
        let deep = snapshot.find("a/deep").unwrap();
        assert!(deep.is_dir());
        assert!(deep.children().is_empty(), "threads={threads}");
        assert!(snapshot.find("a/deep/y").is_none());

        let cancelled: Vec<_> = snapshot
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::Cancelled)
            .collect();
        assert_eq!(cancelled.len(), 1, "threads={threads}");
    }
}

#[test]
fn test_flat_excludes_root() {
    let temp = create_test_tree();
    let flat = Scanner::new()
        .scan_flat(temp.path(), &ScanOptions::new())
        .unwrap();

    assert_eq!(flat.entries.len(), 7);
    assert!(flat.entries.iter().all(|e| e.path != "."));
    assert_eq!(flat.root, temp.path().to_string_lossy());

    let value = serde_json::to_value(&flat).unwrap();
    let readme = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["path"] == "README.md")
        .unwrap();
    assert_eq!(readme["type"], "file");
    assert_eq!(readme["size"], 6);
    assert_eq!(readme["extension"], "md");
}

#[test]
fn test_flat_is_sorted_by_path() {
    let temp = create_test_tree();
    fs::write(temp.path().join("src.txt"), "").unwrap();

    let sequential = Scanner::new()
        .scan_flat(temp.path(), &ScanOptions::new())
        .unwrap();
    let options = ScanOptions::builder().threads(2usize).build().unwrap();
    let parallel = Scanner::new().scan_flat(temp.path(), &options).unwrap();

    let paths: Vec<&str> = sequential.entries.iter().map(|e| e.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    let parallel_paths: Vec<&str> = parallel.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, parallel_paths);
}

#[cfg(unix)]
#[test]
fn test_flat_carries_owner() {
    use std::os::unix::fs::MetadataExt;

    let temp = create_test_tree();
    let metadata = fs::metadata(temp.path().join("README.md")).unwrap();

    let flat = Scanner::new()
        .scan_flat(temp.path(), &ScanOptions::new())
        .unwrap();
    let readme = flat.entries.iter().find(|e| e.path == "README.md").unwrap();

    assert_eq!(readme.uid, metadata.uid());
    assert_eq!(readme.gid, metadata.gid());
    let expected = OsFileSystem
        .user_name(metadata.uid())
        .unwrap_or_else(|| metadata.uid().to_string());
    assert_eq!(readme.user.as_str(), expected);
    assert!(!readme.group.is_empty());
}

#[test]
fn test_stream_parses_line_by_line() {
    let temp = create_test_tree();
    let mut buf = Vec::new();
    let summary = write_stream(&Scanner::new(), temp.path(), &ScanOptions::new(), &mut buf).unwrap();

    let text = String::from_utf8(buf).unwrap();
    let values: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(values.len(), 1 + summary.entries as usize);
    assert_eq!(values[0]["record"], "header");
    assert_eq!(values[0]["schema"], "fileman.snapshot.v1");
    assert!(values[1..].iter().all(|v| v["record"] == "entry"));
    assert!(values[1..].iter().all(|v| v["relpath"].is_string()));

    let src = values.iter().find(|v| v["relpath"] == "src").unwrap();
    assert_eq!(src["type"], "dir");
    assert!(src.get("children").is_none());
}

#[test]
fn test_progress_is_published() {
    let temp = create_test_tree();
    let scanner = Scanner::new();
    let mut rx = scanner.subscribe();

    scanner.scan(temp.path(), &ScanOptions::new()).unwrap();

    let mut updates = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        updates.push(progress);
    }
    let last = updates.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.total_items(), 8);
    assert_eq!(last.bytes_scanned, 6 + 12 + 8);
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_symlink_recorded_with_raw_target() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abc").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        symlink("../a.txt", temp.path().join("sub/link")).unwrap();
        symlink("does/not/exist", temp.path().join("dangling")).unwrap();

        let snapshot = Scanner::new().scan(temp.path(), &ScanOptions::new()).unwrap();

        assert_eq!(relpaths(&snapshot.tree), vec![".", "a.txt", "dangling", "sub", "sub/link"]);

        let Some(Entry::Symlink(link)) = snapshot.find("sub/link") else {
            panic!("sub/link should be a symlink");
        };
        assert_eq!(link.target, "../a.txt");

        let Some(Entry::Symlink(dangling)) = snapshot.find("dangling") else {
            panic!("dangling should be a symlink");
        };
        assert_eq!(dangling.target, "does/not/exist");
        assert!(!snapshot.has_warnings());
    }

    #[test]
    fn test_file_dir_link_scenario() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        symlink("a.txt", temp.path().join("link")).unwrap();

        let snapshot = Scanner::new().scan(temp.path(), &ScanOptions::new()).unwrap();
        let children = snapshot.tree.children();
        assert_eq!(children.len(), 3);

        match &children[0] {
            Entry::File(f) => {
                assert_eq!(f.meta.name.as_str(), "a.txt");
                assert_eq!(f.size, 5);
            }
            other => panic!("expected a.txt, got {other:?}"),
        }
        match &children[1] {
            Entry::Symlink(s) => {
                assert_eq!(s.meta.name.as_str(), "link");
                assert_eq!(s.target, "a.txt");
            }
            other => panic!("expected link, got {other:?}"),
        }
        match &children[2] {
            Entry::Directory(d) => {
                assert_eq!(d.meta.name.as_str(), "sub");
                assert!(d.children.is_empty());
            }
            other => panic!("expected sub, got {other:?}"),
        }
    }

    #[test]
    fn test_following_resolves_links() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abc").unwrap();
        symlink("a.txt", temp.path().join("alias")).unwrap();
        symlink("missing", temp.path().join("broken")).unwrap();

        let options = ScanOptions::builder().follow_symlinks(true).build().unwrap();
        let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

        let Some(Entry::File(alias)) = snapshot.find("alias") else {
            panic!("alias should resolve to a file");
        };
        assert_eq!(alias.size, 3);

        assert!(snapshot.find("broken").is_none());
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::BrokenSymlink);
    }

    #[test]
    fn test_second_path_to_directory_is_not_a_cycle() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/f.txt"), "data").unwrap();
        symlink("real", temp.path().join("alias")).unwrap();

        for threads in [1usize, 2] {
            let options = ScanOptions::builder()
                .follow_symlinks(true)
                .threads(threads)
                .build()
                .unwrap();

            let forward = Scanner::with_filesystem(OrderedFs { reverse: false })
                .scan(temp.path(), &options)
                .unwrap();
            let backward = Scanner::with_filesystem(OrderedFs { reverse: true })
                .scan(temp.path(), &options)
                .unwrap();

            assert_eq!(forward.tree, backward.tree, "threads={threads}");
            for snapshot in [&forward, &backward] {
                assert!(snapshot.find("real/f.txt").is_some());
                assert!(snapshot.find("alias/f.txt").is_some());
                assert!(!snapshot.has_warnings());
            }
        }
    }

    #[test]
    fn test_symlink_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        symlink("..", temp.path().join("a/b/up")).unwrap();

        let options = ScanOptions::builder().follow_symlinks(true).build().unwrap();
        let snapshot = Scanner::new().scan(temp.path(), &options).unwrap();

        let up = snapshot.find("a/b/up").unwrap();
        assert!(up.is_dir());
        assert!(up.children().is_empty());
        assert!(
            snapshot
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::SymlinkCycle && w.path == "a/b/up")
        );
    }
}
