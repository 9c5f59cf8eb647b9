//! Isolated execution context on its own thread.
//!
//! The context gets a dedicated OS thread running a current-thread tokio
//! runtime. Nothing is shared with the controller: requests and responses
//! cross as JSON-encoded [`Envelope`]s over a channel pair, and stdio ports
//! are transferred inside the spawn envelope.
//!
//! ```text
//!   controller runtime                         "vos-context" thread
//!   ──────────────────                         ────────────────────
//!   call() ── pending[id] = tx
//!          ── Envelope{json, ports} ──────────▶ serve(): decode, handle
//!                                               (one task per request)
//!   reader ◀────────────── Envelope{json} ───── BridgeResponse{id, ..}
//!          ── pending.remove(id).send(..)
//! ```
//!
//! When the response channel closes (terminate, panic, runtime failure)
//! the reader rejects every pending call with `Disconnected` and refuses
//! new ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use vos_ipc::{
    BridgeCall, BridgeReply, BridgeRequest, BridgeResponse, ContextPorts, Envelope,
    InitializeParams,
};

use crate::bridge::{BridgeKind, ExecutionBridge};
use crate::context::ExecutionContext;
use crate::error::{BridgeError, BridgeResult};
use crate::loader::ContextHandle;

type Waiter = oneshot::Sender<BridgeResult<BridgeReply>>;

/// Calls awaiting a response.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, (&'static str, Waiter)>,
    closed: bool,
}

/// Bridge to a context running on a dedicated thread.
pub struct WorkerBridge {
    handle: ContextHandle,
    outbound: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
}

impl WorkerBridge {
    /// Start the context thread and the response reader.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(handle: ContextHandle) -> BridgeResult<Self> {
        let (to_worker, inbound) = mpsc::unbounded_channel::<Envelope>();
        let (outbound, mut from_worker) = mpsc::unbounded_channel::<Envelope>();

        std::thread::Builder::new()
            .name(String::from("vos-context"))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(target: "vos::context", error = %e, "failed to build context runtime");
                        return;
                    }
                };
                runtime.block_on(serve(inbound, outbound));
            })
            .map_err(|e| BridgeError::Startup(e.to_string()))?;

        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(envelope) = from_worker.recv().await {
                match envelope.decode_response() {
                    Ok(response) => resolve(&reader_pending, response),
                    Err(e) => {
                        warn!(target: "vos::bridge", error = %e, "dropping undecodable response")
                    }
                }
            }
            reject_all(&reader_pending);
        });

        info!(target: "vos::bridge", module = %handle.module_url, "worker context started");
        Ok(Self {
            handle,
            outbound: Mutex::new(Some(to_worker)),
            pending,
            next_id: AtomicU64::new(0),
        })
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).waiters.len()
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Envelope>> {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ExecutionBridge for WorkerBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Worker
    }

    fn bootstrap(&self) -> InitializeParams {
        InitializeParams {
            module_url: self.handle.module_url.clone(),
            payload_len: self.handle.payload.len() as u64,
        }
    }

    async fn call(
        &self,
        call: BridgeCall,
        ports: Option<ContextPorts>,
    ) -> BridgeResult<BridgeReply> {
        let method = call.method();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = Envelope::request(&BridgeRequest { id, call }, ports)
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(BridgeError::Disconnected);
            }
            pending.waiters.insert(id, (method, tx));
        }

        let sent = self
            .sender()
            .map(|sender| sender.send(envelope).is_ok())
            .unwrap_or(false);
        if !sent {
            lock(&self.pending).waiters.remove(&id);
            return Err(BridgeError::Disconnected);
        }

        let result = rx.await.map_err(|_| BridgeError::Disconnected)?;
        if method == vos_ipc::method::TERMINATE && result.is_ok() {
            // The context thread exits after answering terminate
            self.outbound
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
        }
        result
    }
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("module_url", &self.handle.module_url)
            .field("pending", &self.pending_calls())
            .finish()
    }
}

// =============================================================================
// Controller side
// =============================================================================

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn resolve(pending: &Mutex<Pending>, response: BridgeResponse) {
    let id = response.id;
    let Some((method, waiter)) = lock(pending).waiters.remove(&id) else {
        warn!(target: "vos::bridge", id, "response for unknown request");
        return;
    };
    let result = response
        .into_result()
        .map_err(|message| BridgeError::remote(method, message));
    let _ = waiter.send(result);
}

fn reject_all(pending: &Mutex<Pending>) {
    let waiters: Vec<Waiter> = {
        let mut pending = lock(pending);
        pending.closed = true;
        pending.waiters.drain().map(|(_, (_, tx))| tx).collect()
    };
    if !waiters.is_empty() {
        debug!(target: "vos::bridge", count = waiters.len(), "rejecting pending calls");
    }
    for waiter in waiters {
        let _ = waiter.send(Err(BridgeError::Disconnected));
    }
}

// =============================================================================
// Context side
// =============================================================================

/// Context thread main loop.
async fn serve(
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
    outbound: mpsc::UnboundedSender<Envelope>,
) {
    let context = ExecutionContext::new();

    while let Some(envelope) = inbound.recv().await {
        let request = match envelope.decode_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(target: "vos::context", error = %e, "dropping undecodable request");
                continue;
            }
        };
        let Envelope { ports, .. } = envelope;
        let BridgeRequest { id, call } = request;

        if matches!(call, BridgeCall::Terminate) {
            let reply = context.handle(call, None).await;
            post(&outbound, id, reply);
            break;
        }

        let context = context.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let reply = context.handle(call, ports).await;
            post(&outbound, id, reply);
        });
    }

    debug!(target: "vos::context", "context loop finished");
}

fn post(outbound: &mpsc::UnboundedSender<Envelope>, id: u64, reply: Result<BridgeReply, String>) {
    let response = match reply {
        Ok(reply) => BridgeResponse::ok(id, reply),
        Err(message) => BridgeResponse::err(id, message),
    };
    match Envelope::response(&response) {
        Ok(envelope) => {
            let _ = outbound.send(envelope);
        }
        Err(e) => warn!(target: "vos::context", id, error = %e, "failed to encode response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vos_ipc::{stdio_channel, SpawnParams, StreamMessage};

    fn handle() -> ContextHandle {
        ContextHandle {
            module_url: "file:///assets/context.wasm".into(),
            module: Arc::new(b"\0asm".to_vec()),
            payload: Arc::new(b"{}".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_thread() {
        let bridge = WorkerBridge::start(handle()).unwrap();
        bridge.initialize().await.unwrap();

        let (mut controller, ports) = stdio_channel(4);
        let params = SpawnParams {
            command: "echo".into(),
            args: vec!["from".into(), "worker".into()],
            cwd: "/".into(),
            ..Default::default()
        };
        let remote_id = bridge.spawn(params, ports).await.unwrap();

        assert_eq!(bridge.wait(&remote_id).await.unwrap(), 0);
        assert_eq!(
            controller.stdout.recv().await,
            Some(StreamMessage::Data(b"from worker\n".to_vec()))
        );
        bridge.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_carries_method() {
        let bridge = WorkerBridge::start(handle()).unwrap();
        bridge.initialize().await.unwrap();

        let err = bridge.wait("not-a-process").await.unwrap_err();
        match err {
            BridgeError::RemoteCallFailed { method, message } => {
                assert_eq!(method, "wait");
                assert!(message.contains("no such process"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        bridge.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_calls_rejected_on_terminate() {
        let bridge = Arc::new(WorkerBridge::start(handle()).unwrap());
        bridge.initialize().await.unwrap();

        let (_controller, ports) = stdio_channel(4);
        let params = SpawnParams {
            command: "sleep".into(),
            args: vec!["60000".into()],
            cwd: "/".into(),
            ..Default::default()
        };
        let remote_id = bridge.spawn(params, ports).await.unwrap();

        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.wait(&remote_id).await })
        };
        tokio::task::yield_now().await;

        bridge.terminate().await.unwrap();
        // Either the SIGKILL exit or the closed transport settles the wait
        match waiter.await.unwrap() {
            Ok(code) => assert_eq!(code, 137),
            Err(e) => assert_eq!(e, BridgeError::Disconnected),
        }

        assert_eq!(
            bridge.kill("anything", Default::default()).await,
            Err(BridgeError::Disconnected)
        );
        assert_eq!(bridge.pending_calls(), 0);
    }
}
