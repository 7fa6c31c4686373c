//! Directory identity for symlink cycle detection.

use std::sync::Arc;

/// Identity of a directory on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirKey {
    /// Device ID.
    pub dev: u64,
    /// Inode number.
    pub inode: u64,
}

impl DirKey {
    pub fn new(dev: u64, inode: u64) -> Self {
        Self { dev, inode }
    }

    /// Platforms without inodes report 0, which identifies nothing.
    pub fn is_known(&self) -> bool {
        self.inode != 0
    }
}

/// The chain of directories from the scan root down to the current one.
///
/// When symlinks are followed, a link back to one of these would make the
/// walk loop forever. A second path to a directory elsewhere in the tree is
/// not a cycle and is descended normally.
///
/// The chain is a shared linked list, so extending it for a child is O(1)
/// and parallel workers can hold their own branch.
#[derive(Debug, Clone, Default)]
pub struct Ancestors {
    head: Option<Arc<Link>>,
}

#[derive(Debug)]
struct Link {
    key: DirKey,
    parent: Ancestors,
}

impl Ancestors {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// This chain extended by `key`. Unknown keys are not recorded.
    pub fn with(&self, key: DirKey) -> Self {
        if !key.is_known() {
            return self.clone();
        }
        Self {
            head: Some(Arc::new(Link {
                key,
                parent: self.clone(),
            })),
        }
    }

    /// Check whether `key` is on the chain.
    pub fn contains(&self, key: &DirKey) -> bool {
        self.iter().any(|k| k == *key)
    }

    /// Keys from the innermost directory outwards.
    pub fn iter(&self) -> impl Iterator<Item = DirKey> + '_ {
        std::iter::successors(self.head.as_deref(), |link| link.parent.head.as_deref())
            .map(|link| link.key)
    }

    /// Number of directories on the chain.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}
