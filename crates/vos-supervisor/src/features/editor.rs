//! Headless editor.
//!
//! Keeps open buffers in memory, saves them through the VFS and watches each
//! open path so a buffer can tell when the file changed underneath it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use vos_vfs::{normalize_path, WatchHandle};

use crate::context::EnvContext;
use crate::error::EnvResult;

struct Buffer {
    content: String,
    dirty: bool,
    /// Set by the watch on any change to the file
    changed_on_disk: Arc<AtomicBool>,
    _watch: WatchHandle,
}

/// Buffer editor over the VFS.
pub struct EditorFeature {
    ctx: EnvContext,
    buffers: Mutex<BTreeMap<String, Buffer>>,
}

impl EditorFeature {
    pub(crate) fn new(ctx: EnvContext) -> Self {
        Self {
            ctx,
            buffers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open a file into a buffer (or return the open buffer's content).
    pub async fn open(&self, path: &str) -> EnvResult<String> {
        let path = normalize_path(path);
        if let Some(buffer) = self.lock().get(&path) {
            return Ok(buffer.content.clone());
        }

        let content = self.ctx.vfs().read_to_string(&path).await?;
        let changed_on_disk = Arc::new(AtomicBool::new(false));
        let flag = changed_on_disk.clone();
        let watch = self.ctx.vfs().watch(&path, move |_, _| {
            flag.store(true, Ordering::Release);
        });

        debug!(target: "vos::editor", path = %path, "opened");
        self.lock().insert(
            path,
            Buffer {
                content: content.clone(),
                dirty: false,
                changed_on_disk,
                _watch: watch,
            },
        );
        Ok(content)
    }

    /// Replace a buffer's content. Returns false if the buffer is not open.
    pub fn edit(&self, path: &str, content: impl Into<String>) -> bool {
        match self.lock().get_mut(&normalize_path(path)) {
            Some(buffer) => {
                buffer.content = content.into();
                buffer.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Current buffer content.
    pub fn content(&self, path: &str) -> Option<String> {
        self.lock()
            .get(&normalize_path(path))
            .map(|b| b.content.clone())
    }

    /// True if the buffer has unsaved edits.
    pub fn is_dirty(&self, path: &str) -> bool {
        self.lock()
            .get(&normalize_path(path))
            .is_some_and(|b| b.dirty)
    }

    /// True if the file changed on disk since it was opened or last saved.
    pub fn is_stale(&self, path: &str) -> bool {
        self.lock()
            .get(&normalize_path(path))
            .is_some_and(|b| b.changed_on_disk.load(Ordering::Acquire))
    }

    /// Write a buffer back to the VFS.
    pub async fn save(&self, path: &str) -> EnvResult<()> {
        let path = normalize_path(path);
        let Some(content) = self.content(&path) else {
            return Ok(());
        };
        self.ctx.vfs().write_file(&path, content).await?;

        // Our own write fired the watch; that is not an external change
        if let Some(buffer) = self.lock().get_mut(&path) {
            buffer.dirty = false;
            buffer.changed_on_disk.store(false, Ordering::Release);
        }
        debug!(target: "vos::editor", path = %path, "saved");
        Ok(())
    }

    /// Re-read a buffer from the VFS, dropping unsaved edits.
    pub async fn reload(&self, path: &str) -> EnvResult<String> {
        let path = normalize_path(path);
        let content = self.ctx.vfs().read_to_string(&path).await?;
        if let Some(buffer) = self.lock().get_mut(&path) {
            buffer.content = content.clone();
            buffer.dirty = false;
            buffer.changed_on_disk.store(false, Ordering::Release);
        }
        Ok(content)
    }

    /// Close a buffer and remove its watch.
    pub fn close(&self, path: &str) -> bool {
        self.lock().remove(&normalize_path(path)).is_some()
    }

    /// Close every buffer.
    pub fn close_all(&self) {
        self.lock().clear();
    }

    /// Paths of open buffers, sorted.
    pub fn open_buffers(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Buffer>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for EditorFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorFeature")
            .field("buffers", &self.open_buffers())
            .finish()
    }
}
