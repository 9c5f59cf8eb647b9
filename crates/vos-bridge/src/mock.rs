//! Same-process bridge.
//!
//! Runs the execution core on the caller's runtime. Each call still
//! completes in stages (posted, handled, delivered) with a yield between
//! them, so callers observe the same asynchronous ordering they would with
//! the worker.

use async_trait::async_trait;
use tracing::debug;
use vos_ipc::{BridgeCall, BridgeReply, ContextPorts, InitializeParams};

use crate::bridge::{BridgeKind, ExecutionBridge};
use crate::context::ExecutionContext;
use crate::error::{BridgeError, BridgeResult};

/// URL reported to the context when no module was loaded.
pub const MOCK_MODULE_URL: &str = "mock://context";

/// Bridge backed by an in-process [`ExecutionContext`].
#[derive(Clone, Default)]
pub struct MockBridge {
    context: ExecutionContext,
}

impl MockBridge {
    /// Create a mock bridge with a fresh context.
    pub fn new() -> Self {
        debug!(target: "vos::bridge", "using mock execution bridge");
        Self::default()
    }

    /// The context behind this bridge.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

#[async_trait]
impl ExecutionBridge for MockBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Mock
    }

    fn bootstrap(&self) -> InitializeParams {
        InitializeParams {
            module_url: MOCK_MODULE_URL.to_string(),
            payload_len: 0,
        }
    }

    async fn call(
        &self,
        call: BridgeCall,
        ports: Option<ContextPorts>,
    ) -> BridgeResult<BridgeReply> {
        let method = call.method();

        // posted
        tokio::task::yield_now().await;
        let result = self.context.handle(call, ports).await;
        // delivered
        tokio::task::yield_now().await;

        result.map_err(|message| BridgeError::remote(method, message))
    }
}

impl std::fmt::Debug for MockBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBridge")
            .field("running", &self.context.running_count())
            .finish()
    }
}
