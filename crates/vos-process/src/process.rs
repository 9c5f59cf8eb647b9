//! Process handles.
//!
//! A [`Process`] is a cheap, cloneable handle. Its status and exit code are
//! written only through [`Process::transition`], which succeeds once: the
//! first caller (monitor or kill) wins and every later attempt is a no-op.
//! The transition publishes the exit code on a watch channel, so `wait()`
//! is push-based and never polls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use vos_ipc::{ControllerPorts, PortReceiver, SpawnParams};

use crate::error::{ProcessError, ProcessResult};
use crate::stdio::{ProcessInput, ProcessOutput};
use crate::types::{Pid, ProcessInfo, ProcessStatus};

/// Callback run once when a process leaves `Running`.
pub(crate) type ExitHook = Box<dyn FnOnce(&ProcessInfo) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ExitState {
    status: ProcessStatus,
    exit_code: Option<i32>,
}

struct ProcessInner {
    pid: Pid,
    remote_id: String,
    command: String,
    args: Vec<String>,
    cwd: String,
    env: BTreeMap<String, String>,
    state: watch::Sender<ExitState>,
    stdin: ProcessInput,
    stdout: Mutex<Option<PortReceiver>>,
    stderr: Mutex<Option<PortReceiver>>,
    on_exit: Mutex<Option<ExitHook>>,
    /// Exit code of a kill in flight; the monitor records `Killed` with it
    kill_code: Mutex<Option<i32>>,
}

/// Handle to a spawned process.
#[derive(Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        remote_id: String,
        params: SpawnParams,
        ports: ControllerPorts,
    ) -> Self {
        let (state, _) = watch::channel(ExitState {
            status: ProcessStatus::Running,
            exit_code: None,
        });
        Self {
            inner: Arc::new(ProcessInner {
                pid,
                remote_id,
                command: params.command,
                args: params.args,
                cwd: params.cwd,
                env: params.env,
                state,
                stdin: ProcessInput::new(ports.stdin),
                stdout: Mutex::new(Some(ports.stdout)),
                stderr: Mutex::new(Some(ports.stderr)),
                on_exit: Mutex::new(None),
                kill_code: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    /// Identifier assigned by the execution context.
    pub fn remote_id(&self) -> &str {
        &self.inner.remote_id
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    pub fn cwd(&self) -> &str {
        &self.inner.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.inner.env
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn status(&self) -> ProcessStatus {
        self.inner.state.borrow().status
    }

    /// Exit code, once the process has left `Running`.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.state.borrow().exit_code
    }

    pub fn is_running(&self) -> bool {
        self.status() == ProcessStatus::Running
    }

    /// Snapshot of this process.
    pub fn info(&self) -> ProcessInfo {
        let state = *self.inner.state.borrow();
        ProcessInfo {
            pid: self.inner.pid,
            remote_id: self.inner.remote_id.clone(),
            command: self.inner.command.clone(),
            args: self.inner.args.clone(),
            cwd: self.inner.cwd.clone(),
            status: state.status,
            exit_code: state.exit_code,
        }
    }

    /// Wait for the exit code.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.inner.state.subscribe();
        loop {
            if let Some(code) = rx.borrow_and_update().exit_code {
                return code;
            }
            // The sender lives as long as `self`
            if rx.changed().await.is_err() {
                return self.exit_code().unwrap_or(-1);
            }
        }
    }

    /// Wait for the exit code, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> ProcessResult<i32> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ProcessError::Timeout { pid: self.pid() })
    }

    // =========================================================================
    // Stdio
    // =========================================================================

    /// Take the stdout stream. Returns `None` after the first call.
    pub fn take_stdout(&self) -> Option<ProcessOutput> {
        take_port(&self.inner.stdout)
    }

    /// Take the stderr stream. Returns `None` after the first call.
    pub fn take_stderr(&self) -> Option<ProcessOutput> {
        take_port(&self.inner.stderr)
    }

    /// The stdin stream.
    pub fn stdin(&self) -> ProcessInput {
        self.inner.stdin.clone()
    }

    // =========================================================================
    // Transitions (manager only)
    // =========================================================================

    /// Leave `Running`. Returns false if the process already had.
    pub(crate) fn transition(&self, status: ProcessStatus, exit_code: i32) -> bool {
        let changed = self.inner.state.send_if_modified(|state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.exit_code = Some(exit_code);
            true
        });
        if changed {
            self.fire_exit_hook();
        }
        changed
    }

    /// Mark a kill as requested, before the bridge is asked to deliver it.
    pub(crate) fn request_kill(&self, exit_code: i32) {
        *lock(&self.inner.kill_code) = Some(exit_code);
    }

    /// Withdraw a kill request the bridge refused.
    pub(crate) fn cancel_kill(&self) {
        lock(&self.inner.kill_code).take();
    }

    /// Record the exit the monitor observed. A requested kill wins over the
    /// remote exit code, which is only the signal's effect.
    pub(crate) fn observe_exit(&self, exit_code: i32) -> bool {
        let requested = *lock(&self.inner.kill_code);
        match requested {
            Some(kill_code) => self.transition(ProcessStatus::Killed, kill_code),
            None => self.transition(ProcessStatus::Exited, exit_code),
        }
    }

    /// Install the exit hook. Runs immediately if the process already ended.
    pub(crate) fn set_exit_hook(&self, hook: ExitHook) {
        *lock(&self.inner.on_exit) = Some(hook);
        if self.status().is_terminal() {
            self.fire_exit_hook();
        }
    }

    fn fire_exit_hook(&self) {
        let hook = lock(&self.inner.on_exit).take();
        if let Some(hook) = hook {
            hook(&self.info());
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.command)
            .field("status", &self.status())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn take_port(slot: &Mutex<Option<PortReceiver>>) -> Option<ProcessOutput> {
    lock(slot).take().map(ProcessOutput::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vos_ipc::stdio_channel;

    fn process() -> Process {
        let (controller, _context) = stdio_channel(4);
        let params = SpawnParams {
            command: "echo".into(),
            args: vec!["hi".into()],
            cwd: "/".into(),
            ..Default::default()
        };
        Process::new(Pid(1), "remote-1".into(), params, controller)
    }

    #[tokio::test]
    async fn test_transition_happens_once() {
        let process = process();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        process.set_exit_hook(Box::new(move |info| {
            assert_eq!(info.status, ProcessStatus::Killed);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(process.transition(ProcessStatus::Killed, 143));
        assert!(!process.transition(ProcessStatus::Exited, 0));

        assert_eq!(process.status(), ProcessStatus::Killed);
        assert_eq!(process.exit_code(), Some(143));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_requested_kill_wins_over_observed_exit() {
        let process = process();
        process.request_kill(143);

        // The remote side died of the signal before the kill call returned
        assert!(process.observe_exit(143));
        assert_eq!(process.status(), ProcessStatus::Killed);
        assert_eq!(process.exit_code(), Some(143));
    }

    #[tokio::test]
    async fn test_cancelled_kill_observes_plain_exit() {
        let process = process();
        process.request_kill(137);
        process.cancel_kill();

        assert!(process.observe_exit(0));
        assert_eq!(process.status(), ProcessStatus::Exited);
        assert_eq!(process.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_wait_is_woken_by_transition() {
        let process = process();
        let waiter = {
            let process = process.clone();
            tokio::spawn(async move { process.wait().await })
        };
        tokio::task::yield_now().await;

        process.transition(ProcessStatus::Exited, 7);
        assert_eq!(waiter.await.unwrap(), 7);
        // Already set: resolves immediately
        assert_eq!(process.wait().await, 7);
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let process = process();
        let err = process
            .wait_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, ProcessError::Timeout { pid: Pid(1) });
    }

    #[tokio::test]
    async fn test_outputs_are_taken_once() {
        let process = process();
        assert!(process.take_stdout().is_some());
        assert!(process.take_stdout().is_none());
        assert!(process.take_stderr().is_some());
    }

    #[tokio::test]
    async fn test_hook_set_after_exit_runs_immediately() {
        let process = process();
        process.transition(ProcessStatus::Exited, 0);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        process.set_exit_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
