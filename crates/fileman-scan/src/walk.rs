//! Depth-first traversal shared by every scan mode.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use fileman_core::{
    DirectoryEntry, Entry, EntryKind, FileEntry, ScanError, ScanOptions, ScanWarning,
    SymlinkEntry,
};

use crate::filter::ExcludeFilter;
use crate::fs::{DirListing, FileSystem, StatKind};
use crate::inode::{Ancestors, DirKey};
use crate::progress::ProgressTracker;

/// Relpath (and name) of the scan root.
pub(crate) const ROOT_RELPATH: &str = ".";

/// Join a child name onto its parent's relpath with `/`.
pub(crate) fn join_relpath(parent: &str, name: &str) -> String {
    if parent == ROOT_RELPATH {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Outcome of inspecting one listed child.
pub(crate) enum Visit {
    /// Hidden or excluded; nothing recorded.
    Skipped,
    /// Stat failed; the entry is dropped.
    Dropped(ScanWarning),
    /// File or unfollowed symlink.
    Leaf(Entry),
    /// Directory. `descend` is false at the depth limit or when it is one
    /// of its own ancestors.
    Dir {
        dir: DirectoryEntry,
        path: PathBuf,
        ancestors: Ancestors,
        descend: bool,
        warning: Option<ScanWarning>,
    },
}

/// State shared by the sequential and parallel walkers.
pub(crate) struct WalkContext<'a, F> {
    pub fs: &'a F,
    pub options: &'a ScanOptions,
    pub filter: ExcludeFilter,
    pub progress: ProgressTracker,
    pub cancel: Option<CancellationToken>,
}

impl<'a, F: FileSystem> WalkContext<'a, F> {
    pub fn new(
        fs: &'a F,
        options: &'a ScanOptions,
        progress: ProgressTracker,
        cancel: Option<CancellationToken>,
    ) -> Result<Self, ScanError> {
        Ok(Self {
            fs,
            options,
            filter: ExcludeFilter::new(&options.exclude_patterns)?,
            progress,
            cancel,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Stat and list the root. Failures here are fatal.
    ///
    /// Also returns the ancestor chain for the root's children.
    pub fn open_root(
        &self,
        root: &Path,
    ) -> Result<(DirectoryEntry, Vec<DirListing>, Ancestors), ScanError> {
        let stat = self
            .fs
            .metadata(root)
            .map_err(|e| ScanError::root_io(root, e))?;
        if !stat.is_dir() {
            return Err(ScanError::RootNotADirectory {
                path: root.to_path_buf(),
            });
        }

        let listing = self
            .fs
            .read_dir(root)
            .map_err(|e| ScanError::root_io(root, e))?;

        let ancestors = if self.options.follow_symlinks {
            Ancestors::new().with(DirKey::new(stat.dev, stat.inode))
        } else {
            Ancestors::new()
        };
        self.progress.record(EntryKind::Directory, 0, ROOT_RELPATH);

        Ok((
            DirectoryEntry::new(stat.to_meta(ROOT_RELPATH, ROOT_RELPATH)),
            listing,
            ancestors,
        ))
    }

    /// Classify one listed child found at `depth`. `ancestors` is the chain
    /// of the directory being listed.
    ///
    /// Hidden and exclude checks run before any stat call.
    pub fn visit(
        &self,
        parent_relpath: &str,
        ancestors: &Ancestors,
        child: DirListing,
        depth: u32,
    ) -> Visit {
        let DirListing { name, path } = child;
        if self.options.should_skip_hidden(&name) {
            return Visit::Skipped;
        }

        let relpath = join_relpath(parent_relpath, &name);
        if self.filter.is_excluded(&name, &relpath) {
            tracing::trace!(path = %relpath, "excluded");
            return Visit::Skipped;
        }

        let stat = if self.options.follow_symlinks {
            self.fs.metadata(&path)
        } else {
            self.fs.symlink_metadata(&path)
        };
        let stat = match stat {
            Ok(stat) => stat,
            Err(err) => return Visit::Dropped(self.stat_failure(&path, relpath, &err)),
        };

        let visit = match stat.kind {
            StatKind::Symlink => {
                let target = match self.fs.read_link(&path) {
                    Ok(target) => target.to_string_lossy().into_owned(),
                    Err(err) => {
                        tracing::debug!(path = %relpath, error = %err, "unreadable symlink target");
                        String::new()
                    }
                };
                Visit::Leaf(Entry::Symlink(SymlinkEntry {
                    meta: stat.to_meta(name, relpath),
                    target,
                }))
            }
            StatKind::Directory => {
                let mut descend = self.options.may_descend(depth);
                let mut warning = None;
                let mut chain = ancestors.clone();
                if self.options.follow_symlinks {
                    let key = DirKey::new(stat.dev, stat.inode);
                    if descend && key.is_known() && ancestors.contains(&key) {
                        descend = false;
                        warning = Some(ScanWarning::symlink_cycle(relpath.clone()));
                    } else {
                        chain = ancestors.with(key);
                    }
                }
                Visit::Dir {
                    dir: DirectoryEntry::new(stat.to_meta(name, relpath)),
                    path,
                    ancestors: chain,
                    descend,
                    warning,
                }
            }
            StatKind::File | StatKind::Other => Visit::Leaf(Entry::File(FileEntry::new(
                stat.to_meta(name, relpath),
                stat.size,
            ))),
        };

        match &visit {
            Visit::Leaf(entry) => self.progress.record_entry(entry),
            Visit::Dir { dir, .. } => {
                self.progress
                    .record(EntryKind::Directory, 0, &dir.meta.relpath)
            }
            _ => {}
        }
        visit
    }

    /// Log and count a warning.
    pub fn note(&self, warning: &ScanWarning) {
        tracing::debug!(path = %warning.path, kind = ?warning.kind, "{}", warning.message);
        self.progress.record_warning();
    }

    fn stat_failure(&self, path: &Path, relpath: String, err: &io::Error) -> ScanWarning {
        if self.options.follow_symlinks && err.kind() == io::ErrorKind::NotFound {
            let dangling = self
                .fs
                .symlink_metadata(path)
                .is_ok_and(|s| s.kind == StatKind::Symlink);
            if dangling {
                let target = self
                    .fs
                    .read_link(path)
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return ScanWarning::broken_symlink(relpath, &target);
            }
        }
        ScanWarning::metadata(relpath, err)
    }
}

/// One entry produced by [`Walk`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Position in discovery order; the root is 0.
    pub id: usize,
    /// `id` of the containing directory (`None` for the root).
    pub parent: Option<usize>,
    /// Depth below the root.
    pub depth: u32,
    /// The entry. Directories are yielded without children.
    pub entry: Entry,
}

/// Directory waiting to be listed.
struct PendingDir {
    path: PathBuf,
    relpath: String,
    ancestors: Ancestors,
    depth: u32,
    id: usize,
}

/// Sequential depth-first walk using an explicit stack.
///
/// Entries are yielded as they are discovered; memory use is bounded by
/// the pending-directory stack plus one directory listing. Every entry
/// appears after its parent.
pub struct Walk<'a, F> {
    cx: WalkContext<'a, F>,
    stack: Vec<PendingDir>,
    ready: VecDeque<WalkEntry>,
    warnings: Vec<ScanWarning>,
    next_id: usize,
    finished: bool,
}

impl<'a, F: FileSystem> Walk<'a, F> {
    pub(crate) fn new(cx: WalkContext<'a, F>, root: &Path) -> Result<Self, ScanError> {
        let (root_dir, listing, ancestors) = cx.open_root(root)?;

        let mut walk = Self {
            cx,
            stack: Vec::new(),
            ready: VecDeque::new(),
            warnings: Vec::new(),
            next_id: 0,
            finished: false,
        };

        let root_id = walk.push_ready(None, 0, Entry::Directory(root_dir));
        if walk.cx.options.may_descend(0) {
            if walk.cx.is_cancelled() {
                walk.warn(ScanWarning::cancelled());
            } else {
                let pending = PendingDir {
                    path: root.to_path_buf(),
                    relpath: ROOT_RELPATH.to_string(),
                    ancestors,
                    depth: 0,
                    id: root_id,
                };
                walk.expand(&pending, listing);
            }
        }

        Ok(walk)
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Consume the walk, returning its warnings.
    pub fn into_warnings(self) -> Vec<ScanWarning> {
        self.warnings
    }

    fn push_ready(&mut self, parent: Option<usize>, depth: u32, entry: Entry) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.ready.push_back(WalkEntry {
            id,
            parent,
            depth,
            entry,
        });
        id
    }

    fn warn(&mut self, warning: ScanWarning) {
        self.cx.note(&warning);
        self.warnings.push(warning);
    }

    fn expand(&mut self, dir: &PendingDir, listing: Vec<DirListing>) {
        let depth = dir.depth + 1;
        for child in listing {
            match self.cx.visit(&dir.relpath, &dir.ancestors, child, depth) {
                Visit::Skipped => {}
                Visit::Dropped(warning) => self.warn(warning),
                Visit::Leaf(entry) => {
                    self.push_ready(Some(dir.id), depth, entry);
                }
                Visit::Dir {
                    dir: child,
                    path,
                    ancestors,
                    descend,
                    warning,
                } => {
                    if let Some(warning) = warning {
                        self.warn(warning);
                    }
                    let relpath = child.meta.relpath.clone();
                    let id = self.push_ready(Some(dir.id), depth, Entry::Directory(child));
                    if descend {
                        self.stack.push(PendingDir {
                            path,
                            relpath,
                            ancestors,
                            depth,
                            id,
                        });
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.cx.progress.finish();
        }
    }
}

impl<F: FileSystem> Iterator for Walk<'_, F> {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.ready.pop_front() {
                return Some(entry);
            }
            if self.finished {
                return None;
            }

            let Some(dir) = self.stack.pop() else {
                self.finish();
                return None;
            };

            if self.cx.is_cancelled() {
                self.stack.clear();
                self.warn(ScanWarning::cancelled());
                self.finish();
                return None;
            }

            match self.cx.fs.read_dir(&dir.path) {
                Ok(listing) => self.expand(&dir, listing),
                Err(err) => self.warn(ScanWarning::read_dir(dir.relpath.clone(), &err)),
            }
        }
    }
}
