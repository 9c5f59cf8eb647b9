//! Environment orchestrator for VOS.
//!
//! Brings the subsystems up in dependency order and tears them down again:
//!
//! ```text
//!   ┌──────────────────────────── Environment ─────────────────────────────┐
//!   │                                                                      │
//!   │  1 store ──► 2 bridge ──► 3 vfs ──► 4 processes ──► 5 features ──►   │
//!   │                                                     6 plugins        │
//!   │                                                                      │
//!   │            EnvContext { vfs, processes, events, config }             │
//!   │                 │ handed to features and plugins                     │
//!   └─────────────────┼────────────────────────────────────────────────────┘
//!                     ▼
//!        TerminalFeature · EditorFeature · dyn Plugin
//! ```
//!
//! A failing step aborts `init()` with [`EnvError::InitializationFailed`],
//! which is also published on the `error` topic. `dispose()` runs the steps
//! in reverse and is idempotent.
//!
//! # Example
//!
//! ```no_run
//! use vos_supervisor::{EnvConfig, Environment, MountTree};
//! use vos_process::SpawnOptions;
//!
//! # async fn demo() -> vos_supervisor::EnvResult<()> {
//! let env = Environment::builder().config(EnvConfig::default()).start().await?;
//! env.mount(&MountTree::new().file("hello.txt", "hi")).await?;
//!
//! let process = env.spawn("echo", &["hi"], SpawnOptions::default().cwd("/")).await?;
//! let code = process.wait().await;
//! env.dispose().await;
//! # let _ = code;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod features;
pub mod mount;
pub mod plugin;

pub use config::{ContextConfig, EnvConfig, EnvOverrides, StoreConfig, StoreKind};
pub use context::EnvContext;
pub use environment::{Environment, EnvironmentBuilder, ErrorCallback};
pub use error::{EnvError, EnvResult, InitStep};
pub use features::{CommandOutput, EditorFeature, FeatureId, LoadedFeature, TerminalFeature};
pub use mount::{MountNode, MountTree};
pub use plugin::{Plugin, PluginRegistry};
