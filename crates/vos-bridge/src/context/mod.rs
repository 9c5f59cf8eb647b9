//! Execution context core.
//!
//! This is the side of the boundary that actually runs programs. It owns the
//! remote process table and answers [`BridgeCall`]s. Both bridge variants
//! drive the same core: the worker from its own thread and runtime, the mock
//! directly from the caller's tasks.
//!
//! ```text
//!   BridgeCall ──▶ ExecutionContext::handle
//!                    │
//!                    ├─ initialize → record bootstrap, reply version
//!                    ├─ spawn      → uuid remote id, run program task
//!                    ├─ kill       → signal the program task
//!                    ├─ wait       → await exit code
//!                    └─ terminate  → SIGKILL everything, refuse further calls
//! ```
//!
//! A program leaves the table as soon as it exits. Its exit code stays in a
//! bounded list of recent exits so a late `wait` or `kill` still resolves.

mod programs;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};
use vos_ipc::{
    BridgeCall, BridgeReply, ContextPorts, InitializeParams, KillParams, Signal, SpawnParams,
    PROTOCOL_VERSION,
};

use programs::ProgramIo;

/// Exit codes kept after their program leaves the table.
pub const RECENT_EXITS: usize = 256;

/// A program running inside the context.
struct RemoteProcess {
    command: String,
    exit: watch::Receiver<Option<i32>>,
    /// Taken by the first kill
    kill: Option<oneshot::Sender<Signal>>,
}

#[derive(Default)]
struct ContextState {
    bootstrap: Option<InitializeParams>,
    processes: HashMap<String, RemoteProcess>,
    /// Oldest first, at most `RECENT_EXITS` entries
    recent: VecDeque<(String, i32)>,
    terminated: bool,
}

impl ContextState {
    /// Move a finished program out of the table.
    fn retire(&mut self, remote_id: &str, exit_code: i32) {
        self.processes.remove(remote_id);
        if self.recent.len() == RECENT_EXITS {
            self.recent.pop_front();
        }
        self.recent.push_back((remote_id.to_string(), exit_code));
    }

    fn recent_exit(&self, remote_id: &str) -> Option<i32> {
        self.recent
            .iter()
            .rev()
            .find(|(id, _)| id == remote_id)
            .map(|(_, code)| *code)
    }
}

/// Remote process table and call dispatcher.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    state: Arc<Mutex<ContextState>>,
}

impl ExecutionContext {
    /// Create an empty, uninitialized context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer one call. Errors are plain messages, as they would be on the
    /// wire.
    pub async fn handle(
        &self,
        call: BridgeCall,
        ports: Option<ContextPorts>,
    ) -> Result<BridgeReply, String> {
        trace!(target: "vos::context", method = call.method(), "handle");
        match call {
            BridgeCall::Initialize(params) => self.initialize(params),
            BridgeCall::Spawn(params) => {
                let ports = ports.ok_or_else(|| String::from("spawn requires stdio ports"))?;
                self.spawn(params, ports)
            }
            BridgeCall::Kill(params) => self.kill(params),
            BridgeCall::Wait(params) => self.wait(&params.remote_id).await,
            BridgeCall::Terminate => self.terminate(),
        }
    }

    /// Number of programs that have not exited yet.
    pub fn running_count(&self) -> usize {
        self.lock()
            .processes
            .values()
            .filter(|p| p.exit.borrow().is_none())
            .count()
    }

    /// Number of programs still in the process table.
    pub fn tracked_count(&self) -> usize {
        self.lock().processes.len()
    }

    /// True once `initialize` has been handled.
    pub fn is_initialized(&self) -> bool {
        self.lock().bootstrap.is_some()
    }

    fn initialize(&self, params: InitializeParams) -> Result<BridgeReply, String> {
        let mut state = self.lock();
        if state.terminated {
            return Err(String::from("context terminated"));
        }
        debug!(
            target: "vos::context",
            module = %params.module_url,
            payload_len = params.payload_len,
            "context initialized"
        );
        state.bootstrap = Some(params);
        Ok(BridgeReply::Initialized {
            version: PROTOCOL_VERSION.to_string(),
        })
    }

    fn spawn(&self, params: SpawnParams, ports: ContextPorts) -> Result<BridgeReply, String> {
        let mut state = self.lock();
        if state.terminated {
            return Err(String::from("context terminated"));
        }
        if state.bootstrap.is_none() {
            return Err(String::from("context not initialized"));
        }

        let remote_id = uuid::Uuid::new_v4().to_string();
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();

        state.processes.insert(
            remote_id.clone(),
            RemoteProcess {
                command: params.command.clone(),
                exit: exit_rx,
                kill: Some(kill_tx),
            },
        );
        drop(state);

        debug!(
            target: "vos::context",
            remote_id = %remote_id,
            command = %params.command,
            "spawned program"
        );

        let id = remote_id.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut io = ProgramIo::new(ports, &params);
            let mut kill_rx = kill_rx;
            let code = {
                let run = programs::run(&params, &mut io);
                tokio::select! {
                    code = run => code,
                    Ok(signal) = &mut kill_rx => signal.exit_code(),
                }
            };
            io.finish().await;
            trace!(target: "vos::context", remote_id = %id, code, "program finished");
            state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retire(&id, code);
            let _ = exit_tx.send(Some(code));
        });

        Ok(BridgeReply::Spawned { remote_id })
    }

    fn kill(&self, params: KillParams) -> Result<BridgeReply, String> {
        let mut state = self.lock();
        if state.recent_exit(&params.remote_id).is_some() {
            return Ok(BridgeReply::Killed);
        }
        let process = state
            .processes
            .get_mut(&params.remote_id)
            .ok_or_else(|| format!("no such process: {}", params.remote_id))?;

        // Exited or already signalled: nothing left to do
        if let Some(kill) = process.kill.take() {
            if process.exit.borrow().is_none() {
                debug!(
                    target: "vos::context",
                    remote_id = %params.remote_id,
                    command = %process.command,
                    signal = %params.signal,
                    "killing program"
                );
                let _ = kill.send(params.signal);
            }
        }
        Ok(BridgeReply::Killed)
    }

    async fn wait(&self, remote_id: &str) -> Result<BridgeReply, String> {
        let mut exit = {
            let state = self.lock();
            if let Some(exit_code) = state.recent_exit(remote_id) {
                return Ok(BridgeReply::Exited { exit_code });
            }
            state
                .processes
                .get(remote_id)
                .map(|p| p.exit.clone())
                .ok_or_else(|| format!("no such process: {}", remote_id))?
        };

        loop {
            if let Some(exit_code) = *exit.borrow_and_update() {
                return Ok(BridgeReply::Exited { exit_code });
            }
            if exit.changed().await.is_err() {
                return match *exit.borrow() {
                    Some(exit_code) => Ok(BridgeReply::Exited { exit_code }),
                    None => Err(format!("process {} vanished", remote_id)),
                };
            }
        }
    }

    fn terminate(&self) -> Result<BridgeReply, String> {
        let mut state = self.lock();
        state.terminated = true;
        let mut killed = 0;
        for process in state.processes.values_mut() {
            if let Some(kill) = process.kill.take() {
                if kill.send(Signal::SIGKILL).is_ok() {
                    killed += 1;
                }
            }
        }
        debug!(target: "vos::context", killed, "context terminated");
        Ok(BridgeReply::Terminated)
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
