//! In-memory entry store.
//!
//! Used for tests and for environments configured without persistence.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{stamp, EntryStore};
use crate::error::{StoreError, StoreResult};
use crate::types::Entry;

/// BTreeMap-backed store that does not persist data.
pub struct MemoryStore {
    name: String,
    entries: Mutex<BTreeMap<String, Entry>>,
    closed: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Entry>> {
        self.check_open()?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, mut entry: Entry) -> StoreResult<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        stamp(entries.get(&entry.path), &mut entry);
        let modified_at = entry.modified_at;
        entries.insert(entry.path.clone(), entry);
        Ok(modified_at)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_open()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        self.check_open()?;
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
