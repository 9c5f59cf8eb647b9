//! Headless terminal.
//!
//! Runs command lines through the process manager and collects their output.
//! `cd` is handled locally since the working directory is terminal state,
//! not process state.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use vos_process::{Pid, ProcessOutput, Signal, SpawnOptions};
use vos_vfs::{join_path, normalize_path};

use crate::context::EnvContext;
use crate::error::{EnvError, EnvResult};

/// Result of one command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

struct TerminalState {
    cwd: String,
    history: Vec<String>,
    running: BTreeSet<Pid>,
}

/// Command-line runner.
pub struct TerminalFeature {
    ctx: EnvContext,
    state: Mutex<TerminalState>,
}

impl TerminalFeature {
    pub(crate) fn new(ctx: EnvContext) -> Self {
        Self {
            ctx,
            state: Mutex::new(TerminalState {
                cwd: String::from("/"),
                history: Vec::new(),
                running: BTreeSet::new(),
            }),
        }
    }

    /// Current working directory.
    pub fn cwd(&self) -> String {
        self.lock().cwd.clone()
    }

    /// Every line run so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Run one command line to completion.
    pub async fn run(&self, line: &str) -> EnvResult<CommandOutput> {
        let line = line.trim();
        let cwd = {
            let mut state = self.lock();
            if !line.is_empty() {
                state.history.push(line.to_string());
            }
            state.cwd.clone()
        };

        if line.is_empty() {
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        if let Some(target) = line.strip_prefix("cd").filter(|rest| {
            rest.is_empty() || rest.starts_with(char::is_whitespace)
        }) {
            return self.change_dir(&cwd, target.trim()).await;
        }

        let options = SpawnOptions::default().cwd(cwd).shell(true);
        let process = self.ctx.processes().spawn(line, &[], options).await?;
        let pid = process.pid();
        self.lock().running.insert(pid);
        debug!(target: "vos::terminal", pid = %pid, line, "running");

        let stdout = process.take_stdout();
        let stderr = process.take_stderr();
        let (stdout, stderr, exit_code) =
            tokio::join!(collect(stdout), collect(stderr), process.wait());

        self.lock().running.remove(&pid);
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn change_dir(&self, cwd: &str, target: &str) -> EnvResult<CommandOutput> {
        let next = match target {
            "" => String::from("/"),
            t if t.starts_with('/') => normalize_path(t),
            t => join_path(cwd, t),
        };
        let is_dir = match self.ctx.vfs().stat(&next).await {
            Ok(stat) => stat.is_directory(),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(EnvError::Vfs(e)),
        };

        if is_dir {
            self.lock().cwd = next;
            Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("cd: {}: No such directory\n", target),
            })
        }
    }

    /// Kill anything this terminal still has running.
    pub(crate) async fn destroy(&self) -> EnvResult<()> {
        let running: Vec<Pid> = std::mem::take(&mut self.lock().running)
            .into_iter()
            .collect();
        for pid in running {
            self.ctx.processes().kill(pid, Signal::SIGHUP).await?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TerminalFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalFeature")
            .field("cwd", &self.cwd())
            .finish()
    }
}

async fn collect(output: Option<ProcessOutput>) -> String {
    match output {
        Some(output) => output.read_to_string().await,
        None => String::new(),
    }
}
