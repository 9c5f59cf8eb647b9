//! Parent → children index.
//!
//! The store is flat, so listing a directory would otherwise mean scanning
//! every key. The index is rebuilt from `list_keys()` on init and then kept
//! in step by the VFS under its mutation lock.

use std::collections::{BTreeMap, BTreeSet};

use crate::path::{filename, join_path, parent_path};

/// Sorted children names per directory path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirIndex {
    children: BTreeMap<String, BTreeSet<String>>,
}

impl DirIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a full key listing.
    pub fn rebuild<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for key in keys {
            index.insert(key.as_ref());
        }
        index
    }

    /// Record `path` under its parent. The root is never a child.
    pub fn insert(&mut self, path: &str) {
        if path == "/" {
            return;
        }
        self.children
            .entry(parent_path(path))
            .or_default()
            .insert(filename(path).to_string());
    }

    /// Forget `path` (and its own child set, if any).
    pub fn remove(&mut self, path: &str) {
        if path != "/" {
            let parent = parent_path(path);
            if let Some(set) = self.children.get_mut(&parent) {
                set.remove(filename(path));
                if set.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
        self.children.remove(path);
    }

    /// Sorted immediate child names of `dir`.
    pub fn children(&self, dir: &str) -> Vec<String> {
        self.children
            .get(dir)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if `dir` has at least one child.
    pub fn has_children(&self, dir: &str) -> bool {
        self.children.get(dir).is_some_and(|set| !set.is_empty())
    }

    /// Every descendant of `dir`, children before their parents.
    pub fn descendants_post_order(&self, dir: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_post_order(dir, &mut out);
        out
    }

    fn collect_post_order(&self, dir: &str, out: &mut Vec<String>) {
        for name in self.children(dir) {
            let child = join_path(dir, &name);
            self.collect_post_order(&child, out);
            out.push(child);
        }
    }
}
