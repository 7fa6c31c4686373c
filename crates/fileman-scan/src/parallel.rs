//! Parallel tree construction on a rayon pool.
//!
//! Each directory's sub-directories are listed in parallel. Every worker
//! builds its own subtree and warning buffer; the parent merges them once
//! the workers return, so the tree itself is never shared.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use fileman_core::{DirectoryEntry, Entry, ScanError, ScanWarning};

use crate::fs::{DirListing, FileSystem};
use crate::inode::Ancestors;
use crate::walk::{Visit, WalkContext};

/// Build the full tree below `root`, returning it with the collected warnings.
pub(crate) fn build_tree<F: FileSystem>(
    cx: &WalkContext<'_, F>,
    root: &Path,
) -> Result<(Entry, Vec<ScanWarning>), ScanError> {
    let (mut root_dir, listing, ancestors) = cx.open_root(root)?;
    let interrupted = AtomicBool::new(false);

    let mut warnings = Vec::new();
    if cx.options.may_descend(0) {
        if cx.is_cancelled() {
            interrupted.store(true, Ordering::Relaxed);
        } else {
            warnings = fill_dir(cx, &mut root_dir, &ancestors, 0, listing, &interrupted);
        }
    }

    if interrupted.load(Ordering::Relaxed) {
        let warning = ScanWarning::cancelled();
        cx.note(&warning);
        warnings.push(warning);
    }
    cx.progress.finish();

    Ok((Entry::Directory(root_dir), warnings))
}

/// Populate `dir` (found at `depth`) from its listing and recurse into
/// sub-directories in parallel. `ancestors` is the chain of `dir` itself.
fn fill_dir<F: FileSystem>(
    cx: &WalkContext<'_, F>,
    dir: &mut DirectoryEntry,
    ancestors: &Ancestors,
    depth: u32,
    listing: Vec<DirListing>,
    interrupted: &AtomicBool,
) -> Vec<ScanWarning> {
    let mut warnings = Vec::new();
    let mut subdirs = Vec::new();

    for child in listing {
        match cx.visit(&dir.meta.relpath, ancestors, child, depth + 1) {
            Visit::Skipped => {}
            Visit::Dropped(warning) => {
                cx.note(&warning);
                warnings.push(warning);
            }
            Visit::Leaf(entry) => dir.children.push(entry),
            Visit::Dir {
                dir: child,
                path,
                ancestors: chain,
                descend,
                warning,
            } => {
                if let Some(warning) = warning {
                    cx.note(&warning);
                    warnings.push(warning);
                }
                if descend {
                    subdirs.push((child, path, chain));
                } else {
                    dir.children.push(Entry::Directory(child));
                }
            }
        }
    }

    let results: Vec<(DirectoryEntry, Vec<ScanWarning>)> = subdirs
        .into_par_iter()
        .map(|(mut child, path, chain)| {
            let child_warnings = descend(cx, &mut child, &path, &chain, depth + 1, interrupted);
            (child, child_warnings)
        })
        .collect();

    for (child, child_warnings) in results {
        dir.children.push(Entry::Directory(child));
        warnings.extend(child_warnings);
    }

    warnings
}

fn descend<F: FileSystem>(
    cx: &WalkContext<'_, F>,
    dir: &mut DirectoryEntry,
    path: &Path,
    ancestors: &Ancestors,
    depth: u32,
    interrupted: &AtomicBool,
) -> Vec<ScanWarning> {
    if cx.is_cancelled() {
        interrupted.store(true, Ordering::Relaxed);
        return Vec::new();
    }

    match cx.fs.read_dir(path) {
        Ok(listing) => fill_dir(cx, dir, ancestors, depth, listing, interrupted),
        Err(err) => {
            let warning = ScanWarning::read_dir(dir.meta.relpath.clone(), &err);
            cx.note(&warning);
            vec![warning]
        }
    }
}
