//! VOS Process Management
//!
//! Logical processes that run inside the execution context and expose their
//! stdio to the controller as byte streams.
//!
//! - **ProcessManager**: spawn, kill, kill-all, listing
//! - **Process**: handle with status, push-based `wait`, and stdio
//! - **ProcessInput / ProcessOutput**: stdin writer and stdout/stderr readers
//!
//! # Ownership
//!
//! ```text
//! ┌───────────────────────────────┐        ┌──────────────────────────┐
//! │ ProcessManager                │        │ ExecutionBridge          │
//! │  live: Pid → Process          │──spawn▶│  remote id               │
//! │  next_pid (never reused)      │──kill─▶│                          │
//! │                               │◀─wait──│  exit code               │
//! └───────────────────────────────┘        └──────────────────────────┘
//!        │ Process (Arc)
//!        ├─ status / exit_code   (written once, by kill or monitor)
//!        ├─ stdin  ──▶ port ──▶ program
//!        └─ stdout/stderr ◀── port ◀── program
//! ```

pub mod error;
pub mod manager;
pub mod process;
pub mod stdio;
pub mod types;

pub use error::{ProcessError, ProcessResult};
pub use manager::ProcessManager;
pub use process::Process;
pub use stdio::{ProcessInput, ProcessOutput};
pub use types::{Pid, ProcessInfo, ProcessStatus, SpawnOptions};
pub use vos_ipc::Signal;
