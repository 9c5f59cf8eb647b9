//! Entry store backends.
//!
//! The store is a flat `path → Entry` map. It knows nothing about
//! directories; all hierarchy rules live in [`crate::Vfs`]. Backends must
//! apply writes to the same key in order (last writer wins) and keep each
//! key's `modified_at` strictly increasing.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::Entry;

/// Persistent key → entry store.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Fetch an entry.
    async fn get(&self, key: &str) -> StoreResult<Option<Entry>>;

    /// Insert or replace an entry, returning the `modified_at` actually
    /// stored (bumped past the previous value if needed).
    async fn put(&self, entry: Entry) -> StoreResult<u64>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Every stored key, in lexicographic order.
    async fn list_keys(&self) -> StoreResult<Vec<String>>;

    /// Flush and release the store. Later calls fail with `Closed`.
    async fn close(&self) -> StoreResult<()>;

    /// Store name (database name for persistent backends).
    fn name(&self) -> &str;
}

/// Bump `entry.modified_at` past the previous value for the same key.
pub(crate) fn stamp(previous: Option<&Entry>, entry: &mut Entry) {
    if let Some(prev) = previous {
        if entry.modified_at <= prev.modified_at {
            entry.modified_at = prev.modified_at + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_is_strictly_increasing() {
        let prev = Entry::new_file("/a", Vec::new(), 100);

        let mut stale = Entry::new_file("/a", Vec::new(), 90);
        stamp(Some(&prev), &mut stale);
        assert_eq!(stale.modified_at, 101);

        let mut fresh = Entry::new_file("/a", Vec::new(), 200);
        stamp(Some(&prev), &mut fresh);
        assert_eq!(fresh.modified_at, 200);

        let mut first = Entry::new_file("/b", Vec::new(), 5);
        stamp(None, &mut first);
        assert_eq!(first.modified_at, 5);
    }
}
