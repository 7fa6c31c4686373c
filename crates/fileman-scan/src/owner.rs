//! Owner name resolution for flat records.

use compact_str::{CompactString, ToCompactString};
use dashmap::DashMap;
use rayon::prelude::*;

use fileman_core::FlatEntry;

use crate::fs::FileSystem;

/// Cached uid and gid lookups against a [`FileSystem`].
///
/// Ids without a name resolve to their decimal form.
pub struct OwnerNames<'a, F> {
    fs: &'a F,
    users: DashMap<u32, CompactString>,
    groups: DashMap<u32, CompactString>,
}

impl<'a, F: FileSystem> OwnerNames<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self {
            fs,
            users: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    /// Name for `uid`.
    pub fn user(&self, uid: u32) -> CompactString {
        self.users
            .entry(uid)
            .or_insert_with(|| {
                self.fs
                    .user_name(uid)
                    .map(CompactString::from)
                    .unwrap_or_else(|| uid.to_compact_string())
            })
            .clone()
    }

    /// Name for `gid`.
    pub fn group(&self, gid: u32) -> CompactString {
        self.groups
            .entry(gid)
            .or_insert_with(|| {
                self.fs
                    .group_name(gid)
                    .map(CompactString::from)
                    .unwrap_or_else(|| gid.to_compact_string())
            })
            .clone()
    }

    /// Fill in `user` and `group` on every entry.
    pub fn apply(&self, entries: &mut [FlatEntry]) {
        entries.par_iter_mut().for_each(|entry| {
            entry.user = self.user(entry.uid);
            entry.group = self.group(entry.gid);
        });
    }
}
