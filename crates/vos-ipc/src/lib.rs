//! VOS Bridge Protocol
//!
//! Everything that crosses the isolation boundary between the controller and
//! the execution context is defined here:
//!
//! - **Messages**: request/response envelopes for the remote operations
//!   (`initialize`, `spawn`, `kill`, `wait`, `terminate`)
//! - **Ports**: transferable stream endpoints carrying `data`/`close`
//!   messages for process stdio
//!
//! # Wire Shape
//!
//! ```text
//!   controller                                   execution context
//!   ──────────                                   ─────────────────
//!   BridgeRequest { id, call }  ── Envelope ──▶  dispatch(call)
//!                               (JSON + ports)
//!   pending[id].resolve(...)    ◀── Envelope ──  BridgeResponse { id, result | error }
//!
//!   ControllerPorts.stdin  ── StreamMessage ──▶  ContextPorts.stdin
//!   ControllerPorts.stdout ◀── StreamMessage ──  ContextPorts.stdout
//!   ControllerPorts.stderr ◀── StreamMessage ──  ContextPorts.stderr
//! ```

pub mod messages;
pub mod port;

pub use messages::{
    method, BridgeCall, BridgeReply, BridgeRequest, BridgeResponse, Envelope, InitializeParams,
    KillParams, Signal, SpawnParams, WaitParams, PROTOCOL_VERSION,
};
pub use port::{
    bounded_port, stdio_channel, unbounded_port, ContextPorts, ControllerPorts, PortClosed,
    PortReceiver, PortSender, StreamMessage, DEFAULT_STDIN_QUEUE,
};
