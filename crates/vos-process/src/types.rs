//! Process identifiers, status and snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Manager-local process identifier. 1-based, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process.
///
/// ```text
///            normal exit
///  Running ──────────────▶ Exited
///     │
///     │ kill / bridge failure
///     ▼
///   Killed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Still running
    Running,
    /// Terminated on its own
    Exited,
    /// Terminated by a signal, or lost when the bridge failed
    Killed,
}

impl ProcessStatus {
    /// True for `Exited` and `Killed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::Exited => f.write_str("exited"),
            ProcessStatus::Killed => f.write_str("killed"),
        }
    }
}

/// Options for [`crate::ProcessManager::spawn`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory (default `/`)
    pub cwd: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Split the command line on whitespace
    pub shell: bool,
}

impl SpawnOptions {
    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enable shell-style command splitting.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }
}

/// Point-in-time view of a process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub remote_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
}
