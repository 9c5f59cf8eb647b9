//! Process lifecycle tests over the mock bridge.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vos_bridge::{
    BridgeError, BridgeKind, BridgeResult, ContextHandle, ExecutionBridge, MockBridge,
    WorkerBridge,
};
use vos_events::{Event, EventBus, Topic};
use vos_ipc::{BridgeCall, BridgeReply, ContextPorts, InitializeParams};
use vos_process::{
    Pid, ProcessError, ProcessManager, ProcessStatus, Signal, SpawnOptions,
};
use vos_vfs::{MemoryStore, Vfs};

// ============================================================================
// Helpers
// ============================================================================

async fn vfs(events: &EventBus) -> Arc<Vfs> {
    Arc::new(
        Vfs::new(Arc::new(MemoryStore::default()), events.clone())
            .await
            .unwrap(),
    )
}

async fn manager_with(bridge: Arc<dyn ExecutionBridge>) -> (ProcessManager, EventBus) {
    let events = EventBus::new();
    bridge.initialize().await.unwrap();
    let manager = ProcessManager::new(bridge, vfs(&events).await, events.clone());
    (manager, events)
}

async fn manager() -> (ProcessManager, EventBus) {
    manager_with(Arc::new(MockBridge::new())).await
}

fn record_exits(events: &EventBus) -> Arc<Mutex<Vec<(u32, i32, bool)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events.subscribe(Topic::ProcessExit, move |event| {
        if let Event::ProcessExit {
            pid,
            exit_code,
            killed,
        } = event
        {
            sink.lock().unwrap().push((*pid, *exit_code, *killed));
        }
    });
    seen
}

/// Bridge that spawns fine but whose wait and kill always fail.
struct BrokenBridge {
    inner: MockBridge,
}

#[async_trait]
impl ExecutionBridge for BrokenBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Mock
    }

    fn bootstrap(&self) -> InitializeParams {
        self.inner.bootstrap()
    }

    async fn call(
        &self,
        call: BridgeCall,
        ports: Option<ContextPorts>,
    ) -> BridgeResult<BridgeReply> {
        match call {
            BridgeCall::Wait(_) => Err(BridgeError::Disconnected),
            BridgeCall::Kill(_) => Err(BridgeError::RemoteCallFailed {
                method: "kill".into(),
                message: "refused".into(),
            }),
            other => self.inner.call(other, ports).await,
        }
    }
}

// ============================================================================
// Spawn
// ============================================================================

#[tokio::test]
async fn test_echo_output_and_exit() {
    let (manager, _events) = manager().await;
    let process = manager
        .spawn("echo", &["hi"], SpawnOptions::default())
        .await
        .unwrap();

    assert_eq!(process.pid(), Pid(1));
    assert_ne!(process.remote_id(), "1");

    let stdout = process.take_stdout().unwrap();
    assert!(stdout.read_to_string().await.contains("hi"));

    assert_eq!(process.wait().await, 0);
    assert_eq!(process.status(), ProcessStatus::Exited);
    assert!(manager.get(process.pid()).is_none());
}

#[tokio::test]
async fn test_pids_increase_and_are_not_reused() {
    let (manager, _events) = manager().await;
    let a = manager.spawn("true", &[], SpawnOptions::default()).await.unwrap();
    a.wait().await;
    let b = manager.spawn("true", &[], SpawnOptions::default()).await.unwrap();
    assert_eq!(a.pid(), Pid(1));
    assert_eq!(b.pid(), Pid(2));
}

#[tokio::test]
async fn test_spawn_publishes_events() {
    let (manager, events) = manager().await;
    let spawned = Arc::new(Mutex::new(Vec::new()));
    let sink = spawned.clone();
    events.subscribe(Topic::ProcessSpawn, move |event| {
        if let Event::ProcessSpawn { pid, command } = event {
            sink.lock().unwrap().push((*pid, command.clone()));
        }
    });
    let exits = record_exits(&events);

    let process = manager
        .spawn("exit", &["3"], SpawnOptions::default())
        .await
        .unwrap();
    assert_eq!(process.wait().await, 3);
    tokio::task::yield_now().await;

    assert_eq!(spawned.lock().unwrap().clone(), vec![(1, "exit".to_string())]);
    assert_eq!(exits.lock().unwrap().clone(), vec![(1, 3, false)]);
}

#[tokio::test]
async fn test_cwd_and_env_are_passed_through() {
    let (manager, _events) = manager().await;
    let pwd = manager
        .spawn("pwd", &[], SpawnOptions::default().cwd("/"))
        .await
        .unwrap();
    assert_eq!(
        pwd.take_stdout().unwrap().read_to_string().await,
        "/\n"
    );

    let env = manager
        .spawn("env", &[], SpawnOptions::default().env("HOME", "/home"))
        .await
        .unwrap();
    assert_eq!(env.take_stdout().unwrap().read_to_string().await, "HOME=/home\n");
}

#[tokio::test]
async fn test_invalid_cwd() {
    let (manager, _events) = manager().await;
    let err = manager
        .spawn("pwd", &[], SpawnOptions::default().cwd("/missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::InvalidCwd { ref cwd, .. } if cwd == "/missing"));
    assert!(manager.list_processes().is_empty());
}

#[tokio::test]
async fn test_shell_splitting() {
    let (manager, _events) = manager().await;
    let process = manager
        .spawn("echo a  b", &[], SpawnOptions::default().shell(true))
        .await
        .unwrap();
    assert_eq!(
        process.take_stdout().unwrap().read_to_string().await,
        "a b\n"
    );
}

#[tokio::test]
async fn test_stdin_round_trip() {
    let (manager, _events) = manager().await;
    let process = manager.spawn("cat", &[], SpawnOptions::default()).await.unwrap();
    let stdin = process.stdin();
    let stdout = process.take_stdout().unwrap();

    stdin.write("ping ").await.unwrap();
    stdin.write("pong").await.unwrap();
    stdin.close().await.unwrap();
    assert_eq!(
        stdin.write("late").await.unwrap_err(),
        ProcessError::StreamClosed
    );

    assert_eq!(stdout.read_to_string().await, "ping pong");
    assert_eq!(process.wait().await, 0);
}

#[tokio::test]
async fn test_stdin_queue_override_reaches_shared_handles() {
    let (manager, _events) = manager().await;
    let shared = manager.clone();
    assert_eq!(shared.stdin_queue(), vos_ipc::DEFAULT_STDIN_QUEUE);

    let manager = manager.with_stdin_queue(3);
    assert_eq!(manager.stdin_queue(), 3);
    assert_eq!(shared.stdin_queue(), 3);

    // Zero is clamped to one slot
    let manager = manager.with_stdin_queue(0);
    assert_eq!(shared.stdin_queue(), 1);

    let process = shared
        .spawn("cat", &[], SpawnOptions::default())
        .await
        .unwrap();
    process.stdin().write(b"x".to_vec()).await.unwrap();
    process.stdin().close().await.unwrap();
    assert_eq!(process.take_stdout().unwrap().read_to_end().await, b"x");
    assert_eq!(process.wait().await, 0);
    drop(manager);
}

#[tokio::test]
async fn test_spawn_fails_when_bridge_fails() {
    let (manager, _events) = manager().await;
    manager.bridge().terminate().await.unwrap();

    let err = manager
        .spawn("echo", &[], SpawnOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Bridge(_)));
    assert!(manager.list_processes().is_empty());
}

// ============================================================================
// Kill
// ============================================================================

#[tokio::test]
async fn test_kill_running_process() {
    let (manager, events) = manager().await;
    let exits = record_exits(&events);
    let process = manager
        .spawn("sleep", &["60000"], SpawnOptions::default())
        .await
        .unwrap();

    manager.kill(process.pid(), Signal::SIGTERM).await.unwrap();

    assert_eq!(process.status(), ProcessStatus::Killed);
    assert_eq!(process.wait().await, 143);
    assert!(manager.list_processes().is_empty());
    assert_eq!(exits.lock().unwrap().clone(), vec![(1, 143, true)]);
}

fn worker() -> Arc<dyn ExecutionBridge> {
    let handle = ContextHandle {
        module_url: "file:///tmp/context.wasm".into(),
        module: Arc::new(Vec::new()),
        payload: Arc::new(Vec::new()),
    };
    Arc::new(WorkerBridge::start(handle).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kill_is_recorded_as_killed_under_parallel_scheduling() {
    let mock: Arc<dyn ExecutionBridge> = Arc::new(MockBridge::new());
    for (name, bridge) in [("mock", mock), ("worker", worker())] {
        let (manager, events) = manager_with(bridge).await;
        let exits = record_exits(&events);

        for _ in 0..100 {
            let process = manager
                .spawn("sleep", &["60000"], SpawnOptions::default())
                .await
                .unwrap();
            manager.kill(process.pid(), Signal::SIGTERM).await.unwrap();

            assert_eq!(process.wait().await, 143, "{name}");
            assert_eq!(process.status(), ProcessStatus::Killed, "{name}");
        }

        // The exit event is published right after the status flips
        tokio::time::timeout(Duration::from_secs(5), async {
            while exits.lock().unwrap().len() < 100 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let exits = exits.lock().unwrap().clone();
        assert_eq!(exits.len(), 100, "{name}");
        assert!(
            exits.iter().all(|&(_, code, killed)| code == 143 && killed),
            "{name}: {exits:?}"
        );
        assert!(manager.list_processes().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_kill_exited_process_is_noop() {
    let (manager, events) = manager().await;
    let exits = record_exits(&events);
    let process = manager.spawn("true", &[], SpawnOptions::default()).await.unwrap();
    assert_eq!(process.wait().await, 0);

    manager.kill(process.pid(), Signal::SIGTERM).await.unwrap();
    manager.kill(process.pid(), Signal::SIGKILL).await.unwrap();

    assert_eq!(process.status(), ProcessStatus::Exited);
    assert_eq!(exits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_kill_unknown_pid_fails() {
    let (manager, _events) = manager().await;
    assert_eq!(
        manager.kill(Pid(42), Signal::SIGTERM).await,
        Err(ProcessError::ProcessNotFound(Pid(42)))
    );
    assert_eq!(
        manager.kill(Pid(0), Signal::SIGTERM).await,
        Err(ProcessError::ProcessNotFound(Pid(0)))
    );
}

#[tokio::test]
async fn test_kill_all() {
    let (manager, _events) = manager().await;
    let mut processes = Vec::new();
    for _ in 0..3 {
        processes.push(
            manager
                .spawn("sleep", &["60000"], SpawnOptions::default())
                .await
                .unwrap(),
        );
    }
    let done = manager.spawn("true", &[], SpawnOptions::default()).await.unwrap();
    done.wait().await;
    assert_eq!(manager.list_processes().len(), 3);

    manager.kill_all().await.unwrap();

    assert!(manager
        .list_processes()
        .iter()
        .all(|p| p.status != ProcessStatus::Running));
    assert!(manager.list_processes().is_empty());
    for process in processes {
        assert_eq!(process.status(), ProcessStatus::Killed);
    }
}

#[tokio::test]
async fn test_list_processes_is_ordered() {
    let (manager, _events) = manager().await;
    for _ in 0..3 {
        manager
            .spawn("sleep", &["60000"], SpawnOptions::default())
            .await
            .unwrap();
    }
    let pids: Vec<u32> = manager.list_processes().iter().map(|p| p.pid.0).collect();
    assert_eq!(pids, vec![1, 2, 3]);
    manager.kill_all().await.unwrap();
}

// ============================================================================
// Bridge failures
// ============================================================================

#[tokio::test]
async fn test_monitor_failure_marks_killed() {
    let bridge = Arc::new(BrokenBridge {
        inner: MockBridge::new(),
    });
    let (manager, events) = manager_with(bridge).await;
    let exits = record_exits(&events);

    let process = manager
        .spawn("sleep", &["60000"], SpawnOptions::default())
        .await
        .unwrap();

    assert_eq!(
        process.wait_timeout(Duration::from_secs(5)).await.unwrap(),
        -1
    );
    assert_eq!(process.status(), ProcessStatus::Killed);
    assert_eq!(exits.lock().unwrap().clone(), vec![(1, -1, true)]);
}

#[tokio::test]
async fn test_kill_all_aggregates_failures() {
    // Wait never fails here, so processes stay live until killed
    struct KillRefused {
        inner: MockBridge,
    }

    #[async_trait]
    impl ExecutionBridge for KillRefused {
        fn kind(&self) -> BridgeKind {
            BridgeKind::Mock
        }

        fn bootstrap(&self) -> InitializeParams {
            self.inner.bootstrap()
        }

        async fn call(
            &self,
            call: BridgeCall,
            ports: Option<ContextPorts>,
        ) -> BridgeResult<BridgeReply> {
            match call {
                BridgeCall::Kill(_) => Err(BridgeError::Disconnected),
                other => self.inner.call(other, ports).await,
            }
        }
    }

    let (manager, _events) = manager_with(Arc::new(KillRefused {
        inner: MockBridge::new(),
    }))
    .await;
    for _ in 0..2 {
        manager
            .spawn("sleep", &["60000"], SpawnOptions::default())
            .await
            .unwrap();
    }

    match manager.kill_all().await {
        Err(ProcessError::KillFailed { failures }) => {
            let pids: Vec<Pid> = failures.iter().map(|(pid, _)| *pid).collect();
            assert_eq!(pids, vec![Pid(1), Pid(2)]);
        }
        other => panic!("expected KillFailed, got {:?}", other),
    }
    assert_eq!(manager.live_count(), 2);
}
