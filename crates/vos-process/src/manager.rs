//! Process manager.
//!
//! Owns the live process table and the pid counter. Spawning goes through
//! the execution bridge; a background monitor per process awaits the
//! bridge's exit notification and performs the terminal transition.
//!
//! # Spawn sequence
//!
//! ```text
//!   resolve options ─▶ check cwd (VFS) ─▶ allocate pid ─▶ bridge.spawn
//!        ─▶ register live ─▶ publish process-spawn ─▶ install exit hook
//!        ─▶ start monitor ─▶ return handle
//! ```
//!
//! The exit hook removes the process from the live table and publishes
//! `process-exit`. It runs exactly once, from whichever of kill or monitor
//! performs the transition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::join_all;
use tracing::{debug, info, warn};
use vos_bridge::ExecutionBridge;
use vos_events::{Event, EventBus};
use vos_ipc::{stdio_channel, Signal, SpawnParams, DEFAULT_STDIN_QUEUE};
use vos_vfs::{normalize_path, Vfs, VfsError};

use crate::error::{ProcessError, ProcessResult};
use crate::process::{ExitHook, Process};
use crate::types::{Pid, ProcessInfo, ProcessStatus, SpawnOptions};

struct ManagerInner {
    bridge: Arc<dyn ExecutionBridge>,
    vfs: Arc<Vfs>,
    events: EventBus,
    next_pid: AtomicU32,
    live: Mutex<BTreeMap<Pid, Process>>,
    stdin_queue: AtomicUsize,
}

impl ManagerInner {
    fn live(&self) -> MutexGuard<'_, BTreeMap<Pid, Process>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Spawns, tracks and kills processes. Cloning yields another handle to the
/// same manager.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

impl ProcessManager {
    /// Create a manager over a bridge and a VFS.
    pub fn new(bridge: Arc<dyn ExecutionBridge>, vfs: Arc<Vfs>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                bridge,
                vfs,
                events,
                next_pid: AtomicU32::new(0),
                live: Mutex::new(BTreeMap::new()),
                stdin_queue: AtomicUsize::new(DEFAULT_STDIN_QUEUE),
            }),
        }
    }

    /// Override the stdin queue depth for processes spawned from now on,
    /// through this handle and every clone of it.
    pub fn with_stdin_queue(self, depth: usize) -> Self {
        self.inner
            .stdin_queue
            .store(depth.max(1), Ordering::Release);
        self
    }

    /// Stdin queue depth given to new processes.
    pub fn stdin_queue(&self) -> usize {
        self.inner.stdin_queue.load(Ordering::Acquire)
    }

    /// The bridge processes run on.
    pub fn bridge(&self) -> &Arc<dyn ExecutionBridge> {
        &self.inner.bridge
    }

    // =========================================================================
    // Spawn
    // =========================================================================

    /// Spawn `command` with `args`.
    pub async fn spawn(
        &self,
        command: &str,
        args: &[&str],
        options: SpawnOptions,
    ) -> ProcessResult<Process> {
        let cwd = normalize_path(options.cwd.as_deref().unwrap_or("/"));
        self.check_cwd(&cwd).await?;

        let pid = Pid(self.inner.next_pid.fetch_add(1, Ordering::AcqRel) + 1);
        let params = SpawnParams {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd,
            env: options.env,
            shell: options.shell,
        };

        let (controller, context) = stdio_channel(self.stdin_queue());
        let remote_id = self.inner.bridge.spawn(params.clone(), context).await?;
        let process = Process::new(pid, remote_id, params, controller);

        self.inner.live().insert(pid, process.clone());
        debug!(
            target: "vos::process",
            pid = %pid,
            remote_id = %process.remote_id(),
            command = %command,
            "spawned"
        );
        self.inner.events.publish(Event::ProcessSpawn {
            pid: pid.0,
            command: command.to_string(),
        });

        process.set_exit_hook(exit_hook(Arc::downgrade(&self.inner)));
        self.start_monitor(process.clone());

        Ok(process)
    }

    async fn check_cwd(&self, cwd: &str) -> ProcessResult<()> {
        match self.inner.vfs.stat(cwd).await {
            Ok(stat) if stat.is_directory() => Ok(()),
            Ok(_) => Err(ProcessError::InvalidCwd {
                cwd: cwd.to_string(),
                reason: String::from("not a directory"),
            }),
            Err(e @ VfsError::NotFound { .. }) => Err(ProcessError::InvalidCwd {
                cwd: cwd.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn start_monitor(&self, process: Process) {
        let bridge = self.inner.bridge.clone();
        tokio::spawn(async move {
            match bridge.wait(process.remote_id()).await {
                Ok(code) => {
                    process.observe_exit(code);
                }
                Err(e) => {
                    if process.transition(ProcessStatus::Killed, -1) {
                        warn!(
                            target: "vos::process",
                            pid = %process.pid(),
                            error = %e,
                            "lost process while waiting for exit"
                        );
                    }
                }
            }
        });
    }

    // =========================================================================
    // Kill
    // =========================================================================

    /// Send `signal` to a process.
    ///
    /// Unknown pids fail; pids that already ended are a no-op.
    pub async fn kill(&self, pid: Pid, signal: Signal) -> ProcessResult<()> {
        if pid.0 == 0 || pid.0 > self.inner.next_pid.load(Ordering::Acquire) {
            return Err(ProcessError::ProcessNotFound(pid));
        }
        let Some(process) = self.get(pid) else {
            debug!(target: "vos::process", pid = %pid, "kill: already ended");
            return Ok(());
        };

        process.request_kill(signal.exit_code());
        if let Err(e) = self.inner.bridge.kill(process.remote_id(), signal).await {
            process.cancel_kill();
            return Err(e.into());
        }
        if process.transition(ProcessStatus::Killed, signal.exit_code()) {
            debug!(target: "vos::process", pid = %pid, signal = %signal, "killed");
        }
        Ok(())
    }

    /// Kill every live process concurrently.
    ///
    /// Every kill is attempted; failures are collected into `KillFailed`.
    pub async fn kill_all(&self) -> ProcessResult<()> {
        let pids: Vec<Pid> = self.inner.live().keys().copied().collect();
        if pids.is_empty() {
            return Ok(());
        }
        info!(target: "vos::process", count = pids.len(), "killing all processes");

        let results = join_all(pids.iter().map(|&pid| async move {
            (pid, self.kill(pid, Signal::SIGTERM).await)
        }))
        .await;

        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(pid, result)| match result {
                Err(ProcessError::Bridge(e)) => Some((pid, e)),
                _ => None,
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProcessError::KillFailed { failures })
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshots of live processes, ordered by pid.
    pub fn list_processes(&self) -> Vec<ProcessInfo> {
        self.inner.live().values().map(Process::info).collect()
    }

    /// Live process by pid.
    pub fn get(&self, pid: Pid) -> Option<Process> {
        self.inner.live().get(&pid).cloned()
    }

    /// Number of live processes.
    pub fn live_count(&self) -> usize {
        self.inner.live().len()
    }
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("bridge", &self.inner.bridge.kind())
            .field("live", &self.live_count())
            .finish()
    }
}

fn exit_hook(manager: Weak<ManagerInner>) -> ExitHook {
    Box::new(move |info| {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        manager.live().remove(&info.pid);
        debug!(
            target: "vos::process",
            pid = %info.pid,
            status = %info.status,
            exit_code = ?info.exit_code,
            "process ended"
        );
        manager.events.publish(Event::ProcessExit {
            pid: info.pid.0,
            exit_code: info.exit_code.unwrap_or(-1),
            killed: info.status == ProcessStatus::Killed,
        });
    })
}
