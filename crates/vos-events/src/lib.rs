//! VOS Event Bus
//!
//! A typed publish/subscribe channel shared by the VFS, the process manager
//! and the supervisor. The topic set is closed:
//!
//! - `Ready` - the environment finished booting
//! - `Error` - an orchestrator-level failure
//! - `FileChange` - an entry was added, changed or removed
//! - `ProcessSpawn` / `ProcessExit` - process lifecycle
//!
//! Delivery is synchronous: `publish` invokes every current subscriber of the
//! event's topic, in subscription order, before returning. The subscriber
//! table lock is released before any handler runs, so handlers may subscribe
//! or unsubscribe from inside a callback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

// =============================================================================
// Event Types
// =============================================================================

/// Event topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Environment finished booting
    Ready,
    /// Orchestrator-level failure
    Error,
    /// File or directory changed
    FileChange,
    /// Process spawned
    ProcessSpawn,
    /// Process left the running state
    ProcessExit,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::Ready => "ready",
            Topic::Error => "error",
            Topic::FileChange => "file-change",
            Topic::ProcessSpawn => "process-spawn",
            Topic::ProcessExit => "process-exit",
        };
        f.write_str(name)
    }
}

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Entry created
    Add,
    /// Existing file overwritten
    Change,
    /// Entry removed
    Unlink,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Add => f.write_str("add"),
            ChangeKind::Change => f.write_str("change"),
            ChangeKind::Unlink => f.write_str("unlink"),
        }
    }
}

/// A single filesystem change notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// What happened
    pub kind: ChangeKind,
    /// Normalized absolute path of the affected entry
    pub path: String,
}

/// Events carried by the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum Event {
    /// Environment is ready
    Ready,
    /// Orchestrator-level failure
    Error {
        /// Rendered error message
        message: String,
    },
    /// Filesystem change
    FileChange(FileChange),
    /// A process was spawned
    ProcessSpawn {
        /// Manager-local process id
        pid: u32,
        /// Spawned command
        command: String,
    },
    /// A process left the running state
    ProcessExit {
        /// Manager-local process id
        pid: u32,
        /// Recorded exit code
        exit_code: i32,
        /// True if the process was killed rather than exiting on its own
        killed: bool,
    },
}

impl Event {
    /// Topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            Event::Ready => Topic::Ready,
            Event::Error { .. } => Topic::Error,
            Event::FileChange(_) => Topic::FileChange,
            Event::ProcessSpawn { .. } => Topic::ProcessSpawn,
            Event::ProcessExit { .. } => Topic::ProcessExit,
        }
    }

    /// Convenience constructor for file change events.
    pub fn file_change(kind: ChangeKind, path: impl Into<String>) -> Self {
        Event::FileChange(FileChange {
            kind,
            path: path.into(),
        })
    }
}

// =============================================================================
// Bus
// =============================================================================

/// Subscription identifier returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Event handler callback.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

/// Shared event bus. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to a topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.insert(
            id,
            Subscriber {
                topic,
                handler: Arc::new(handler),
            },
        );
        tracing::trace!(topic = %topic, id = id.0, "subscribed");
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }

    /// Deliver an event to every current subscriber of its topic.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let handlers: Vec<Handler> = self
            .lock()
            .subscribers
            .values()
            .filter(|s| s.topic == topic)
            .map(|s| s.handler.clone())
            .collect();

        tracing::trace!(topic = %topic, subscribers = handlers.len(), "publish");
        for handler in handlers {
            handler(&event);
        }
    }

    /// Number of subscribers on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock()
            .subscribers
            .values()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.lock().subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(bus: &EventBus, topic: Topic) -> (SubscriptionId, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = bus.subscribe(topic, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (id, count)
    }

    #[test]
    fn test_publish_reaches_topic_subscribers_only() {
        let bus = EventBus::new();
        let (_, ready) = counter(&bus, Topic::Ready);
        let (_, files) = counter(&bus, Topic::FileChange);

        bus.publish(Event::Ready);
        bus.publish(Event::file_change(ChangeKind::Add, "/a"));
        bus.publish(Event::file_change(ChangeKind::Unlink, "/a"));

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(files.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_leaves_siblings() {
        let bus = EventBus::new();
        let (first, a) = counter(&bus, Topic::Error);
        let (_, b) = counter(&bus, Topic::Error);

        assert!(bus.unsubscribe(first));
        assert!(!bus.unsubscribe(first));

        bus.publish(Event::Error {
            message: "boom".into(),
        });
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(Topic::Error), 1);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let bus2 = bus.clone();
        let slot2 = slot.clone();
        let hits2 = hits.clone();
        let id = bus.subscribe(Topic::Ready, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot2.lock().unwrap() {
                bus2.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        bus.publish(Event::Ready);
        bus.publish(Event::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_order_matches_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let log = log.clone();
            bus.subscribe(Topic::ProcessSpawn, move |_| log.lock().unwrap().push(n));
        }
        bus.publish(Event::ProcessSpawn {
            pid: 1,
            command: "echo".into(),
        });
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::ProcessExit {
            pid: 3,
            exit_code: 0,
            killed: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"topic\":\"process-exit\""));
        assert_eq!(event.topic().to_string(), "process-exit");
    }
}
