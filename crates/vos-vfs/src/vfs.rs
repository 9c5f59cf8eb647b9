//! POSIX-like filesystem over an [`EntryStore`].
//!
//! Every mutation runs under one async mutex that also guards the
//! [`DirIndex`], so the index and the store never disagree. Change events
//! are collected while the lock is held and published after it is released,
//! which lets handlers call back into the VFS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use vos_events::{ChangeKind, Event, EventBus};

use crate::error::{VfsError, VfsOp, VfsResult};
use crate::index::DirIndex;
use crate::path::{ancestors, normalize_path, parent_path};
use crate::store::EntryStore;
use crate::types::{Entry, Stat};
use crate::watch::WatchHandle;

// =============================================================================
// Clock
// =============================================================================

/// Millisecond clock that never repeats or goes backwards.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    fn now(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn observe(&self, timestamp: u64) {
        self.last.fetch_max(timestamp, Ordering::AcqRel);
    }
}

// =============================================================================
// Vfs
// =============================================================================

/// Virtual filesystem handle.
pub struct Vfs {
    store: Arc<dyn EntryStore>,
    index: Mutex<DirIndex>,
    clock: MonotonicClock,
    events: EventBus,
}

impl Vfs {
    /// Create a VFS over `store` and initialize it.
    pub async fn new(store: Arc<dyn EntryStore>, events: EventBus) -> VfsResult<Self> {
        let vfs = Self {
            store,
            index: Mutex::new(DirIndex::new()),
            clock: MonotonicClock::default(),
            events,
        };
        vfs.init().await?;
        Ok(vfs)
    }

    /// Ensure `/` exists, rebuild the children index and seed the clock.
    ///
    /// Safe to call more than once.
    pub async fn init(&self) -> VfsResult<()> {
        let mut index = self.index.lock().await;

        if self.store.get("/").await?.is_none() {
            let root = Entry::new_directory("/", self.clock.now());
            let stamped = self.store.put(root).await?;
            self.clock.observe(stamped);
            debug!(target: "vos::vfs", "created root directory");
        }

        let keys = self.store.list_keys().await?;
        for key in &keys {
            if let Some(entry) = self.store.get(key).await? {
                self.clock.observe(entry.modified_at);
            }
        }
        *index = DirIndex::rebuild(&keys);

        debug!(target: "vos::vfs", entries = keys.len(), "vfs initialized");
        Ok(())
    }

    /// Shared event bus that change notifications are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Underlying entry store.
    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a file's content.
    pub async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let path = normalize_path(path);
        match self.store.get(&path).await? {
            None => Err(VfsError::not_found(VfsOp::Open, &path)),
            Some(entry) if entry.is_directory() => {
                Err(VfsError::is_a_directory(VfsOp::Open, &path))
            }
            Some(entry) => Ok(entry.content),
        }
    }

    /// Read a file and decode it as UTF-8 (lossily).
    pub async fn read_to_string(&self, path: &str) -> VfsResult<String> {
        let bytes = self.read_file(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Sorted names of a directory's immediate children.
    pub async fn readdir(&self, path: &str) -> VfsResult<Vec<String>> {
        let path = normalize_path(path);
        let index = self.index.lock().await;
        match self.store.get(&path).await? {
            None => Err(VfsError::not_found(VfsOp::Scandir, &path)),
            Some(entry) if entry.is_file() => {
                Err(VfsError::not_a_directory(VfsOp::Scandir, &path))
            }
            Some(_) => Ok(index.children(&path)),
        }
    }

    /// Metadata for a path.
    pub async fn stat(&self, path: &str) -> VfsResult<Stat> {
        let path = normalize_path(path);
        self.store
            .get(&path)
            .await?
            .map(Stat::from)
            .ok_or_else(|| VfsError::not_found(VfsOp::Stat, &path))
    }

    /// True if an entry exists at `path`.
    pub async fn exists(&self, path: &str) -> VfsResult<bool> {
        let path = normalize_path(path);
        Ok(self.store.get(&path).await?.is_some())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create or overwrite a file.
    ///
    /// Publishes `add` for a new file and `change` for an overwrite.
    pub async fn write_file(&self, path: &str, content: impl Into<Vec<u8>>) -> VfsResult<()> {
        let path = normalize_path(path);
        let content = content.into();

        let kind = {
            let mut index = self.index.lock().await;

            let existed = match self.store.get(&path).await? {
                Some(entry) if entry.is_directory() => {
                    return Err(VfsError::is_a_directory(VfsOp::Write, &path));
                }
                Some(_) => true,
                None => false,
            };
            self.require_parent_dir(VfsOp::Write, &path).await?;

            let size = content.len();
            self.put(Entry::new_file(path.clone(), content, self.clock.now()))
                .await?;
            index.insert(&path);
            debug!(target: "vos::vfs", path = %path, size, "write_file");

            if existed {
                ChangeKind::Change
            } else {
                ChangeKind::Add
            }
        };

        self.events.publish(Event::file_change(kind, path));
        Ok(())
    }

    /// Create a directory, optionally with every missing ancestor.
    pub async fn mkdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let path = normalize_path(path);
        let mut created = Vec::new();
        let result = self.mkdir_locked(&path, recursive, &mut created).await;

        // Ancestors created before a failure stay, and so do their events
        for path in created {
            self.events.publish(Event::file_change(ChangeKind::Add, path));
        }
        result
    }

    async fn mkdir_locked(
        &self,
        path: &str,
        recursive: bool,
        created: &mut Vec<String>,
    ) -> VfsResult<()> {
        let mut index = self.index.lock().await;

        if let Some(entry) = self.store.get(path).await? {
            if entry.is_directory() && recursive {
                return Ok(());
            }
            return Err(VfsError::already_exists(VfsOp::Mkdir, path));
        }

        if recursive {
            for ancestor in ancestors(path) {
                match self.store.get(&ancestor).await? {
                    Some(entry) if entry.is_file() => {
                        return Err(VfsError::not_a_directory(VfsOp::Mkdir, path));
                    }
                    Some(_) => {}
                    None => {
                        self.create_dir(&mut index, &ancestor).await?;
                        created.push(ancestor);
                    }
                }
            }
        } else {
            self.require_parent_dir(VfsOp::Mkdir, path).await?;
        }

        self.create_dir(&mut index, path).await?;
        created.push(path.to_string());
        Ok(())
    }

    /// Remove a directory. With `recursive`, its whole subtree goes first.
    pub async fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let path = normalize_path(path);
        if path == "/" {
            return Err(VfsError::PermissionDenied {
                op: VfsOp::Rmdir,
                path,
            });
        }

        let mut removed = Vec::new();
        let result = self.rmdir_locked(&path, recursive, &mut removed).await;

        // Descendants deleted before a failure are gone, so are reported
        for path in removed {
            self.events
                .publish(Event::file_change(ChangeKind::Unlink, path));
        }
        result
    }

    async fn rmdir_locked(
        &self,
        path: &str,
        recursive: bool,
        removed: &mut Vec<String>,
    ) -> VfsResult<()> {
        let mut index = self.index.lock().await;

        match self.store.get(path).await? {
            None => return Err(VfsError::not_found(VfsOp::Rmdir, path)),
            Some(entry) if entry.is_file() => {
                return Err(VfsError::not_a_directory(VfsOp::Rmdir, path));
            }
            Some(_) => {}
        }

        if index.has_children(path) {
            if !recursive {
                return Err(VfsError::NotEmpty {
                    op: VfsOp::Rmdir,
                    path: path.to_string(),
                });
            }
            for child in index.descendants_post_order(path) {
                self.store.delete(&child).await?;
                index.remove(&child);
                removed.push(child);
            }
        }

        self.store.delete(path).await?;
        index.remove(path);
        debug!(target: "vos::vfs", path = %path, removed = removed.len() + 1, "rmdir");
        removed.push(path.to_string());
        Ok(())
    }

    /// Remove a file.
    pub async fn unlink(&self, path: &str) -> VfsResult<()> {
        let path = normalize_path(path);
        {
            let mut index = self.index.lock().await;
            match self.store.get(&path).await? {
                None => return Err(VfsError::not_found(VfsOp::Unlink, &path)),
                Some(entry) if entry.is_directory() => {
                    return Err(VfsError::is_a_directory(VfsOp::Unlink, &path));
                }
                Some(_) => {}
            }
            self.store.delete(&path).await?;
            index.remove(&path);
            debug!(target: "vos::vfs", path = %path, "unlink");
        }

        self.events
            .publish(Event::file_change(ChangeKind::Unlink, path));
        Ok(())
    }

    /// Watch a path and everything beneath it.
    ///
    /// The callback gets the change kind and the changed path relative to
    /// the watched one (the basename when the watched path itself changed).
    pub fn watch<F>(&self, path: &str, callback: F) -> WatchHandle
    where
        F: Fn(ChangeKind, &str) + Send + Sync + 'static,
    {
        WatchHandle::register(&self.events, normalize_path(path), callback)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_parent_dir(&self, op: VfsOp, path: &str) -> VfsResult<()> {
        let parent = parent_path(path);
        match self.store.get(&parent).await? {
            None => Err(VfsError::not_found(op, path)),
            Some(entry) if entry.is_file() => Err(VfsError::not_a_directory(op, path)),
            Some(_) => Ok(()),
        }
    }

    async fn create_dir(&self, index: &mut MutexGuard<'_, DirIndex>, path: &str) -> VfsResult<()> {
        self.put(Entry::new_directory(path, self.clock.now())).await?;
        index.insert(path);
        debug!(target: "vos::vfs", path = %path, "mkdir");
        Ok(())
    }

    async fn put(&self, entry: Entry) -> VfsResult<()> {
        let stamped = self.store.put(entry).await?;
        self.clock.observe(stamped);
        Ok(())
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
#[path = "vfs_tests.rs"]
mod vfs_tests;
