//! Error types for the environment orchestrator.

use std::fmt;

use vos_bridge::BridgeError;
use vos_process::ProcessError;
use vos_vfs::{StoreError, VfsError};

/// Initialization step that can fail, in execution order.
///
/// Creating the process manager and loading features cannot fail once the
/// config has been validated, so they have no step of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InitStep {
    /// Open the persistent entry store
    Store,
    /// Load and start the execution context
    Bridge,
    /// Initialize the filesystem
    Vfs,
    /// Initialize registered plugins
    Plugins,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStep::Store => "store",
            InitStep::Bridge => "bridge",
            InitStep::Vfs => "vfs",
            InitStep::Plugins => "plugins",
        };
        f.write_str(name)
    }
}

/// Errors from environment operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    /// An init step failed; the environment is unusable
    #[error("initialization failed at {step}: {source}")]
    InitializationFailed {
        step: InitStep,
        #[source]
        source: Box<EnvError>,
    },

    /// The operation needs an initialized environment
    #[error("environment not initialized")]
    NotInitialized,

    /// The environment has been disposed
    #[error("environment disposed")]
    Disposed,

    /// Feature name outside the registry
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// A plugin with this name is already registered
    #[error("plugin already registered: {0}")]
    PluginAlreadyRegistered(String),

    /// A plugin failed
    #[error("plugin '{name}' failed: {message}")]
    Plugin { name: String, message: String },

    /// Invalid configuration or mount description
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl EnvError {
    pub(crate) fn at(step: InitStep, source: EnvError) -> Self {
        Self::InitializationFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Create a plugin error.
    pub fn plugin(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(e: serde_json::Error) -> Self {
        EnvError::Config(e.to_string())
    }
}

/// Result type alias for environment operations
pub type EnvResult<T> = Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_failure_display() {
        let err = EnvError::at(InitStep::Bridge, BridgeError::Disconnected.into());
        assert_eq!(
            err.to_string(),
            "initialization failed at bridge: execution context disconnected"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_init_step_names() {
        let names: Vec<String> = [
            InitStep::Store,
            InitStep::Bridge,
            InitStep::Vfs,
            InitStep::Plugins,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["store", "bridge", "vfs", "plugins"]);
    }
}
