//! Both bridge variants must behave the same above the transport.

use std::sync::Arc;

use vos_bridge::{
    BridgeError, BridgeKind, ContextHandle, ExecutionBridge, MockBridge, WorkerBridge,
};
use vos_ipc::{stdio_channel, ControllerPorts, Signal, SpawnParams, StreamMessage};

// ============================================================================
// Helpers
// ============================================================================

fn worker() -> Arc<dyn ExecutionBridge> {
    let handle = ContextHandle {
        module_url: "file:///tmp/context.wasm".into(),
        module: Arc::new(Vec::new()),
        payload: Arc::new(Vec::new()),
    };
    Arc::new(WorkerBridge::start(handle).unwrap())
}

fn mock() -> Arc<dyn ExecutionBridge> {
    Arc::new(MockBridge::new())
}

fn params(command: &str, args: &[&str]) -> SpawnParams {
    SpawnParams {
        command: command.into(),
        args: args.iter().map(|s| s.to_string()).collect(),
        cwd: "/".into(),
        ..Default::default()
    }
}

async fn drain(ports: &mut ControllerPorts) -> String {
    let mut out = Vec::new();
    while let Some(StreamMessage::Data(bytes)) = ports.stdout.recv().await {
        out.extend(bytes);
    }
    String::from_utf8(out).unwrap()
}

async fn for_each_bridge<F, Fut>(test: F)
where
    F: Fn(Arc<dyn ExecutionBridge>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    for bridge in [mock(), worker()] {
        bridge.initialize().await.unwrap();
        test(bridge.clone()).await;
        bridge.terminate().await.unwrap();
    }
}

// ============================================================================
// Parity
// ============================================================================

#[tokio::test]
async fn test_echo_on_both_bridges() {
    for_each_bridge(|bridge| async move {
        let (mut controller, ports) = stdio_channel(4);
        let id = bridge.spawn(params("echo", &["hi"]), ports).await.unwrap();
        assert_eq!(bridge.wait(&id).await.unwrap(), 0);
        assert_eq!(drain(&mut controller).await, "hi\n");
    })
    .await;
}

#[tokio::test]
async fn test_stdin_flows_to_cat() {
    for_each_bridge(|bridge| async move {
        let (mut controller, ports) = stdio_channel(4);
        let id = bridge.spawn(params("cat", &[]), ports).await.unwrap();

        controller.stdin.data(b"one ".to_vec()).await.unwrap();
        controller.stdin.data(b"two".to_vec()).await.unwrap();
        controller.stdin.close().await.unwrap();

        assert_eq!(drain(&mut controller).await, "one two");
        assert_eq!(bridge.wait(&id).await.unwrap(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_kill_sets_signal_exit_code() {
    for_each_bridge(|bridge| async move {
        let (_controller, ports) = stdio_channel(4);
        let id = bridge
            .spawn(params("sleep", &["60000"]), ports)
            .await
            .unwrap();
        bridge.kill(&id, Signal::SIGTERM).await.unwrap();
        assert_eq!(bridge.wait(&id).await.unwrap(), 143);

        // A second kill is harmless
        bridge.kill(&id, Signal::SIGKILL).await.unwrap();
        assert_eq!(bridge.wait(&id).await.unwrap(), 143);
    })
    .await;
}

#[tokio::test]
async fn test_unknown_command_exits_127() {
    for_each_bridge(|bridge| async move {
        let (mut controller, ports) = stdio_channel(4);
        let id = bridge.spawn(params("nope", &[]), ports).await.unwrap();
        assert_eq!(bridge.wait(&id).await.unwrap(), 127);

        let mut err = Vec::new();
        while let Some(StreamMessage::Data(bytes)) = controller.stderr.recv().await {
            err.extend(bytes);
        }
        assert_eq!(String::from_utf8(err).unwrap(), "nope: command not found\n");
    })
    .await;
}

#[tokio::test]
async fn test_kill_unknown_remote_id_fails() {
    for_each_bridge(|bridge| async move {
        let err = bridge.kill("missing", Signal::SIGTERM).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::RemoteCallFailed { ref method, .. } if method == "kill"
        ));
    })
    .await;
}

// ============================================================================
// Variant specifics
// ============================================================================

#[tokio::test]
async fn test_kinds() {
    assert_eq!(mock().kind(), BridgeKind::Mock);
    let worker = worker();
    assert_eq!(worker.kind(), BridgeKind::Worker);
    worker.terminate().await.unwrap();
}

#[tokio::test]
async fn test_mock_refuses_calls_after_terminate() {
    let bridge = mock();
    bridge.initialize().await.unwrap();
    bridge.terminate().await.unwrap();

    let (_controller, ports) = stdio_channel(1);
    let err = bridge.spawn(params("true", &[]), ports).await.unwrap_err();
    assert!(matches!(err, BridgeError::RemoteCallFailed { .. }));
}

#[tokio::test]
async fn test_worker_refuses_calls_after_terminate() {
    let bridge = worker();
    bridge.initialize().await.unwrap();
    bridge.terminate().await.unwrap();

    let (_controller, ports) = stdio_channel(1);
    let err = bridge.spawn(params("true", &[]), ports).await.unwrap_err();
    assert_eq!(err, BridgeError::Disconnected);
}
