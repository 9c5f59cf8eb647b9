//! Error types for the execution bridge.

/// Errors from bridge calls and context bootstrap.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The context answered the call with an error
    #[error("remote call '{method}' failed: {message}")]
    RemoteCallFailed { method: String, message: String },

    /// The transport to the context is gone
    #[error("execution context disconnected")]
    Disconnected,

    /// A message could not be encoded or did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A module or payload could not be resolved or fetched
    #[error("asset error: {0}")]
    Asset(String),

    /// The context thread or runtime could not be started
    #[error("failed to start execution context: {0}")]
    Startup(String),
}

impl BridgeError {
    pub(crate) fn remote(method: &str, message: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn unexpected(method: &str, reply: impl std::fmt::Debug) -> Self {
        Self::Protocol(format!("unexpected reply to '{}': {:?}", method, reply))
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
