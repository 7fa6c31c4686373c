//! Directory scanner.

use std::path::Path;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use fileman_core::{
    Entry, FlatEntry, FlatSnapshot, ScanError, ScanOptions, ScanWarning, Snapshot,
};

use crate::fs::{FileSystem, OsFileSystem};
use crate::owner::OwnerNames;
use crate::parallel;
use crate::progress::{ProgressTracker, ScanProgress};
use crate::walk::{Walk, WalkContext, WalkEntry};

/// Scanner producing snapshots of a directory tree.
///
/// With `threads == 1` (the default) the scan is a sequential depth-first
/// walk; any other value fans directory listing out over rayon.
pub struct Scanner<F = OsFileSystem> {
    fs: F,
    progress_tx: broadcast::Sender<ScanProgress>,
    cancel: Option<CancellationToken>,
}

impl Scanner {
    /// Create a scanner over the host filesystem.
    pub fn new() -> Self {
        Self::with_filesystem(OsFileSystem)
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> Scanner<F> {
    /// Create a scanner over a custom filesystem.
    pub fn with_filesystem(fs: F) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            fs,
            progress_tx,
            cancel: None,
        }
    }

    /// Stop listing new directories once `token` is cancelled. The scan
    /// still returns a valid, partial snapshot.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// The filesystem this scanner reads from.
    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    fn context<'a>(&'a self, options: &'a ScanOptions) -> Result<WalkContext<'a, F>, ScanError> {
        WalkContext::new(
            &self.fs,
            options,
            ProgressTracker::new(self.progress_tx.clone()),
            self.cancel.clone(),
        )
    }

    /// Start a sequential walk that yields entries as they are found,
    /// without building a tree.
    ///
    /// Root errors are reported here; per-entry problems are collected on
    /// the returned [`Walk`].
    pub fn walk<'a>(
        &'a self,
        root: impl AsRef<Path>,
        options: &'a ScanOptions,
    ) -> Result<Walk<'a, F>, ScanError> {
        Walk::new(self.context(options)?, root.as_ref())
    }

    /// Walk `root` and hand each entry to `sink` without building a tree.
    ///
    /// Always sequential. Stops at the first error returned by `sink`;
    /// otherwise returns the warnings collected by the walk.
    pub fn stream<E>(
        &self,
        root: impl AsRef<Path>,
        options: &ScanOptions,
        mut sink: impl FnMut(WalkEntry) -> Result<(), E>,
    ) -> Result<Vec<ScanWarning>, E>
    where
        E: From<ScanError>,
    {
        let mut walk = self.walk(root, options)?;
        for item in walk.by_ref() {
            sink(item)?;
        }
        Ok(walk.into_warnings())
    }

    /// Scan `root` into a tree-mode snapshot.
    pub fn scan(&self, root: impl AsRef<Path>, options: &ScanOptions) -> Result<Snapshot, ScanError> {
        let root = root.as_ref();
        let start = Instant::now();

        let (mut tree, warnings) = if options.threads == 1 {
            self.scan_sequential(root, options)?
        } else {
            self.scan_parallel(root, options)?
        };
        tree.sort_children_by_name();

        let snapshot = Snapshot::new(root.to_string_lossy(), options.clone(), tree, warnings);
        tracing::info!(
            root = %root.display(),
            entries = snapshot.entry_count(),
            warnings = snapshot.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );
        Ok(snapshot)
    }

    /// Scan `root` into a flat list ordered by path, with owner names
    /// resolved. The root itself is not listed.
    pub fn scan_flat(
        &self,
        root: impl AsRef<Path>,
        options: &ScanOptions,
    ) -> Result<FlatSnapshot, ScanError> {
        let root = root.as_ref();
        let mut flat = if options.threads != 1 {
            self.scan(root, options)?.to_flat()
        } else {
            let mut flat = FlatSnapshot::new(root.to_string_lossy());
            let mut walk = self.walk(root, options)?;
            flat.entries
                .extend(walk.by_ref().skip(1).map(|item| FlatEntry::from(&item.entry)));
            flat.warnings = walk.into_warnings();
            flat.sort_by_path();
            flat
        };
        OwnerNames::new(&self.fs).apply(&mut flat.entries);
        Ok(flat)
    }

    fn scan_sequential(
        &self,
        root: &Path,
        options: &ScanOptions,
    ) -> Result<(Entry, Vec<ScanWarning>), ScanError> {
        let mut walk = self.walk(root, options)?;
        let mut nodes: Vec<(Option<usize>, Entry)> = Vec::new();
        for item in walk.by_ref() {
            debug_assert_eq!(item.id, nodes.len());
            nodes.push((item.parent, item.entry));
        }
        let warnings = walk.into_warnings();

        // Children always come after their parent, so folding from the back
        // attaches each subtree only once it is complete.
        while let Some((parent, entry)) = nodes.pop() {
            match parent.and_then(|p| nodes.get_mut(p)) {
                Some((_, Entry::Directory(dir))) => dir.children.push(entry),
                Some(_) => {}
                None => return Ok((entry, warnings)),
            }
        }

        Err(ScanError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::other("walk produced no root entry"),
        })
    }

    fn scan_parallel(
        &self,
        root: &Path,
        options: &ScanOptions,
    ) -> Result<(Entry, Vec<ScanWarning>), ScanError> {
        let cx = self.context(options)?;
        match options.threads {
            0 => parallel::build_tree(&cx, root),
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(|| parallel::build_tree(&cx, root)),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to build thread pool, using the global pool");
                    parallel::build_tree(&cx, root)
                }
            },
        }
    }
}
