//! VOS Virtual Filesystem Layer
//!
//! The VFS layer provides a hierarchical filesystem over a flat, persistent
//! key/value store:
//!
//! - **Types**: `Entry`, `EntryKind`, `Stat` for stored nodes and metadata
//! - **Path**: normalization and parent/child helpers
//! - **Store**: the `EntryStore` trait with memory and on-disk backends
//! - **Index**: the parent → children index behind `readdir`
//! - **Vfs**: POSIX-like operations, change events and watches
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Vfs                                  │
//! │  • Path normalization     • Directory invariants                  │
//! │  • Mutation lock          • Change events (EventBus)              │
//! │                                                                   │
//! │  ┌────────────────────────┐      ┌─────────────────────────────┐ │
//! │  │      DirIndex          │      │        EntryStore           │ │
//! │  │  parent → {children}   │      │  path → Entry               │ │
//! │  │  (rebuilt on init)     │      │  MemoryStore | DiskStore    │ │
//! │  └────────────────────────┘      └─────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Flat storage**: the hierarchy is derived from path keys; nothing in
//!    the store points at anything else
//! 2. **Serialized mutations**: every mutation holds the index lock across
//!    its store writes, so the index and the store never disagree
//! 3. **Monotonic time**: `modified_at` strictly increases per key

pub mod error;
pub mod index;
pub mod path;
pub mod store;
pub mod types;
pub mod vfs;
pub mod watch;

pub use error::{StoreError, StoreResult, VfsError, VfsOp, VfsResult};
pub use index::DirIndex;
pub use path::{filename, is_within, join_path, normalize_path, parent_path, relative_to};
pub use store::{DiskStore, EntryStore, MemoryStore};
pub use types::{Entry, EntryKind, Stat};
pub use vfs::Vfs;
pub use watch::WatchHandle;
