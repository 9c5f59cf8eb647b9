//! VOS Execution Bridge
//!
//! RPC transport between the controller and an isolated execution context.
//! Method calls become request envelopes; replies are matched back to their
//! callers by request id.
//!
//! - **ExecutionBridge**: the capability trait the process manager talks to
//! - **WorkerBridge**: the context on its own thread and runtime, reachable
//!   only through JSON envelopes and transferred ports
//! - **MockBridge**: the same context core driven in-process
//! - **ContextLoader**: module/payload bootstrap with cache-or-fetch, and
//!   the probe that picks a bridge variant
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐         ┌──────────────────────────────┐
//! │   ProcessManager     │         │      ExecutionContext         │
//! │                      │         │  remote id → program task     │
//! │  Arc<dyn Execution-  │ ──────▶ │  echo, cat, sleep, ...        │
//! │       Bridge>        │         └──────────────────────────────┘
//! └──────────────────────┘                 ▲               ▲
//!            │                             │               │
//!            ├── WorkerBridge ─── envelopes (thread) ──────┘
//!            └── MockBridge ───── direct calls ────────────┘
//! ```

pub mod bridge;
pub mod context;
pub mod error;
pub mod loader;
pub mod mock;
pub mod worker;

pub use bridge::{BridgeKind, ExecutionBridge};
pub use context::ExecutionContext;
pub use error::{BridgeError, BridgeResult};
pub use loader::{
    select_bridge, AssetSource, ContextHandle, ContextLoader, DirectorySource, DEFAULT_MODULE,
    DEFAULT_PAYLOAD,
};
pub use mock::{MockBridge, MOCK_MODULE_URL};
pub use worker::WorkerBridge;
