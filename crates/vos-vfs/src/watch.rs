//! Path watches over the shared change stream.

use std::sync::atomic::{AtomicBool, Ordering};

use vos_events::{ChangeKind, Event, EventBus, SubscriptionId, Topic};

use crate::path::{filename, relative_to};

/// A registered watch. Dropping it removes the watch.
#[must_use = "dropping a WatchHandle removes the watch"]
pub struct WatchHandle {
    bus: EventBus,
    id: SubscriptionId,
    active: AtomicBool,
}

impl WatchHandle {
    pub(crate) fn register<F>(bus: &EventBus, watched: String, callback: F) -> Self
    where
        F: Fn(ChangeKind, &str) + Send + Sync + 'static,
    {
        let id = bus.subscribe(Topic::FileChange, move |event| {
            let Event::FileChange(change) = event else {
                return;
            };
            match relative_to(&watched, &change.path) {
                Some("") => callback(change.kind, filename(&change.path)),
                Some(rel) => callback(change.kind, rel),
                None => {}
            }
        });
        Self {
            bus: bus.clone(),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Remove this watch. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.bus.unsubscribe(self.id);
        }
    }

    /// True until `unsubscribe` is called.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
