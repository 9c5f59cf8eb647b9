//! The `ExecutionBridge` capability trait.
//!
//! Implementations only provide [`ExecutionBridge::call`], the raw
//! request/reply exchange. The typed operations are built on top of it and
//! check the reply shape, so both variants behave identically above the
//! transport.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use vos_ipc::{
    BridgeCall, BridgeReply, ContextPorts, InitializeParams, KillParams, Signal, SpawnParams,
    WaitParams, PROTOCOL_VERSION,
};

use crate::error::{BridgeError, BridgeResult};

/// Which bridge variant is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    /// Isolated context on its own thread and runtime
    Worker,
    /// Same-process context
    Mock,
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeKind::Worker => f.write_str("worker"),
            BridgeKind::Mock => f.write_str("mock"),
        }
    }
}

/// RPC surface of an execution context.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Variant tag, for logging.
    fn kind(&self) -> BridgeKind;

    /// Bootstrap parameters sent with `initialize`.
    fn bootstrap(&self) -> InitializeParams;

    /// Send one call and await its reply.
    ///
    /// `ports` travel with the call (only `spawn` carries them).
    async fn call(
        &self,
        call: BridgeCall,
        ports: Option<ContextPorts>,
    ) -> BridgeResult<BridgeReply>;

    /// Bootstrap the context. Fails if it speaks another protocol version.
    async fn initialize(&self) -> BridgeResult<()> {
        match self
            .call(BridgeCall::Initialize(self.bootstrap()), None)
            .await?
        {
            BridgeReply::Initialized { version } if version == PROTOCOL_VERSION => Ok(()),
            BridgeReply::Initialized { version } => Err(BridgeError::Protocol(format!(
                "context speaks {}, expected {}",
                version, PROTOCOL_VERSION
            ))),
            other => Err(BridgeError::unexpected("initialize", other)),
        }
    }

    /// Start a program; returns its remote id.
    async fn spawn(&self, params: SpawnParams, ports: ContextPorts) -> BridgeResult<String> {
        match self.call(BridgeCall::Spawn(params), Some(ports)).await? {
            BridgeReply::Spawned { remote_id } => Ok(remote_id),
            other => Err(BridgeError::unexpected("spawn", other)),
        }
    }

    /// Deliver a signal to a remote program.
    async fn kill(&self, remote_id: &str, signal: Signal) -> BridgeResult<()> {
        let call = BridgeCall::Kill(KillParams {
            remote_id: remote_id.to_string(),
            signal,
        });
        match self.call(call, None).await? {
            BridgeReply::Killed => Ok(()),
            other => Err(BridgeError::unexpected("kill", other)),
        }
    }

    /// Resolve with the exit code once the remote program finishes.
    async fn wait(&self, remote_id: &str) -> BridgeResult<i32> {
        let call = BridgeCall::Wait(WaitParams {
            remote_id: remote_id.to_string(),
        });
        match self.call(call, None).await? {
            BridgeReply::Exited { exit_code } => Ok(exit_code),
            other => Err(BridgeError::unexpected("wait", other)),
        }
    }

    /// Shut the context down. Later calls fail.
    async fn terminate(&self) -> BridgeResult<()> {
        match self.call(BridgeCall::Terminate, None).await? {
            BridgeReply::Terminated => Ok(()),
            other => Err(BridgeError::unexpected("terminate", other)),
        }
    }
}
