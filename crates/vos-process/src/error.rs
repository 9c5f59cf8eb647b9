//! Error types for the process manager.

use vos_bridge::BridgeError;
use vos_vfs::VfsError;

use crate::types::Pid;

/// Errors from process operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The pid was never issued by this manager
    #[error("no such process: {0}")]
    ProcessNotFound(Pid),

    /// The working directory does not name a directory
    #[error("invalid working directory '{cwd}': {reason}")]
    InvalidCwd { cwd: String, reason: String },

    /// The execution bridge failed
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The stream was already closed
    #[error("stream closed")]
    StreamClosed,

    /// A bounded wait ran out
    #[error("timed out waiting for process {pid}")]
    Timeout { pid: Pid },

    /// One or more kills in `kill_all` failed
    #[error("failed to kill {} process(es)", .failures.len())]
    KillFailed { failures: Vec<(Pid, BridgeError)> },

    /// The VFS failed while resolving the working directory
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Result type alias for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;
