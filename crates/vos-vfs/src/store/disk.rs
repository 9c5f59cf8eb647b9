//! On-disk entry store.
//!
//! The whole store is one JSON snapshot at `<dir>/<name>.json`:
//!
//! ```text
//! { "version": 1, "entries": { "/": { ... }, "/a.txt": { ... } } }
//! ```
//!
//! Every commit writes `<name>.json.tmp` and renames it over the snapshot,
//! so a crash leaves either the old or the new state on disk. A snapshot
//! written with a different version is discarded on open.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{stamp, EntryStore};
use crate::error::{StoreError, StoreResult};
use crate::types::Entry;

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, Entry>,
}

struct DiskState {
    entries: BTreeMap<String, Entry>,
    closed: bool,
}

/// JSON-snapshot store that persists across sessions.
pub struct DiskStore {
    name: String,
    version: u32,
    file: PathBuf,
    state: Mutex<DiskState>,
}

impl DiskStore {
    /// Open (or create) the store `name` at `version` inside `dir`.
    pub async fn open(dir: impl AsRef<Path>, name: &str, version: u32) -> StoreResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let file = dir.join(format!("{}.json", name));

        let entries = match tokio::fs::read(&file).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version == version {
                    snapshot.entries
                } else {
                    warn!(
                        target: "vos::vfs",
                        store = name,
                        found = snapshot.version,
                        expected = version,
                        "store version mismatch, discarding contents"
                    );
                    BTreeMap::new()
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            target: "vos::vfs",
            store = name,
            entries = entries.len(),
            path = %file.display(),
            "opened disk store"
        );

        Ok(Self {
            name: name.to_string(),
            version,
            file,
            state: Mutex::new(DiskState {
                entries,
                closed: false,
            }),
        })
    }

    /// Location of the snapshot file.
    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Schema version this store was opened with.
    pub fn version(&self) -> u32 {
        self.version
    }

    async fn commit(&self, entries: &BTreeMap<String, Entry>) -> StoreResult<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            version: u32,
            entries: &'a BTreeMap<String, Entry>,
        }

        let bytes = serde_json::to_vec(&SnapshotRef {
            version: self.version,
            entries,
        })?;
        let tmp = self.file.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.file).await?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for DiskStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Entry>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.entries.get(key).cloned())
    }

    async fn put(&self, mut entry: Entry) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        stamp(state.entries.get(&entry.path), &mut entry);
        let modified_at = entry.modified_at;
        let key = entry.path.clone();
        let previous = state.entries.insert(key.clone(), entry);

        if let Err(e) = self.commit(&state.entries).await {
            // Keep memory in step with what is on disk
            match previous {
                Some(prev) => {
                    state.entries.insert(key, prev);
                }
                None => {
                    state.entries.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(modified_at)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        let Some(previous) = state.entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.commit(&state.entries).await {
            state.entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.entries.keys().cloned().collect())
    }

    async fn close(&self) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.closed = true;
            debug!(target: "vos::vfs", store = %self.name, "closed disk store");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
            store.put(Entry::new_directory("/", 1)).await.unwrap();
            store
                .put(Entry::new_file("/a.txt", b"persisted".to_vec(), 2))
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["/", "/a.txt"]);
        let entry = store.get("/a.txt").await.unwrap().unwrap();
        assert_eq!(entry.content, b"persisted");
        assert!(!dir.path().join("vos.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_version_mismatch_discards_contents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
            store
                .put(Entry::new_file("/old.txt", Vec::new(), 1))
                .await
                .unwrap();
        }

        let store = DiskStore::open(dir.path(), "vos", 2).await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
        assert_eq!(store.version(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
        store
            .put(Entry::new_file("/gone.txt", Vec::new(), 1))
            .await
            .unwrap();
        store.delete("/gone.txt").await.unwrap();
        drop(store);

        let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
        assert!(store.get("/gone.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path(), "vos", 1).await.unwrap();
        store.close().await.unwrap();
        let err = store
            .put(Entry::new_file("/a", Vec::new(), 1))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Closed);
    }
}
