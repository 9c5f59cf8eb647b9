//! Request/response messages for the execution bridge.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::port::ContextPorts;

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "vos-bridge/1";

/// Remote method names.
pub mod method {
    /// Boot the execution context
    pub const INITIALIZE: &str = "initialize";
    /// Start a command
    pub const SPAWN: &str = "spawn";
    /// Terminate a running command
    pub const KILL: &str = "kill";
    /// Wait for a command to finish
    pub const WAIT: &str = "wait";
    /// Shut the execution context down
    pub const TERMINATE: &str = "terminate";
}

// ============================================================================
// Parameters
// ============================================================================

/// Termination signals understood by the execution context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Hangup
    SIGHUP,
    /// Interrupt
    SIGINT,
    /// Kill (cannot be handled)
    SIGKILL,
    /// Polite termination request
    #[default]
    SIGTERM,
}

impl Signal {
    /// POSIX signal number.
    pub fn number(self) -> i32 {
        match self {
            Signal::SIGHUP => 1,
            Signal::SIGINT => 2,
            Signal::SIGKILL => 9,
            Signal::SIGTERM => 15,
        }
    }

    /// Exit code reported for a process terminated by this signal.
    pub fn exit_code(self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `initialize` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// URL of the module the context was loaded from
    pub module_url: String,
    /// Size of the binary payload handed to the context
    pub payload_len: u64,
}

/// `spawn` parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnParams {
    /// Command name (or full command line when `shell` is set)
    pub command: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: String,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Interpret `command` as a whitespace-separated command line
    pub shell: bool,
}

/// `kill` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillParams {
    /// Context-assigned process id
    pub remote_id: String,
    /// Signal to deliver
    pub signal: Signal,
}

/// `wait` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitParams {
    /// Context-assigned process id
    pub remote_id: String,
}

// ============================================================================
// Envelopes
// ============================================================================

/// A remote call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum BridgeCall {
    /// Boot the context
    Initialize(InitializeParams),
    /// Start a command (stdio ports travel alongside in the envelope)
    Spawn(SpawnParams),
    /// Terminate a command
    Kill(KillParams),
    /// Wait for a command to finish
    Wait(WaitParams),
    /// Shut the context down
    Terminate,
}

impl BridgeCall {
    /// Method name used in error messages and logs.
    pub fn method(&self) -> &'static str {
        match self {
            BridgeCall::Initialize(_) => method::INITIALIZE,
            BridgeCall::Spawn(_) => method::SPAWN,
            BridgeCall::Kill(_) => method::KILL,
            BridgeCall::Wait(_) => method::WAIT,
            BridgeCall::Terminate => method::TERMINATE,
        }
    }
}

/// Request sent from the controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// Correlation id, echoed by the response
    pub id: u64,
    /// The call
    pub call: BridgeCall,
}

/// Successful result of a remote call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeReply {
    /// Context booted
    Initialized {
        /// Protocol version spoken by the context
        version: String,
    },
    /// Command started
    Spawned {
        /// Context-assigned process id
        remote_id: String,
    },
    /// Kill delivered
    Killed,
    /// Command finished
    Exited {
        /// Exit code
        exit_code: i32,
    },
    /// Context is shutting down
    Terminated,
}

/// Response sent from the execution context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Correlation id of the request
    pub id: u64,
    /// Result, when the call succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BridgeReply>,
    /// Error message, when the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    /// Successful response.
    pub fn ok(id: u64, reply: BridgeReply) -> Self {
        Self {
            id,
            result: Some(reply),
            error: None,
        }
    }

    /// Failed response.
    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Collapse into a `Result`. A response with neither field set is an error.
    pub fn into_result(self) -> Result<BridgeReply, String> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(reply), None) => Ok(reply),
            (None, None) => Err(String::from("empty response")),
        }
    }
}

/// A transport message: JSON payload plus any transferred ports.
///
/// Ports cannot be serialized; like a `postMessage` transfer list they travel
/// next to the payload and change owner on delivery.
#[derive(Debug)]
pub struct Envelope {
    /// JSON-encoded `BridgeRequest` or `BridgeResponse`
    pub json: String,
    /// Stream endpoints handed to the receiver
    pub ports: Option<ContextPorts>,
}

impl Envelope {
    /// Encode a request, attaching ports if any.
    pub fn request(
        request: &BridgeRequest,
        ports: Option<ContextPorts>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            json: serde_json::to_string(request)?,
            ports,
        })
    }

    /// Encode a response.
    pub fn response(response: &BridgeResponse) -> Result<Self, serde_json::Error> {
        Ok(Self {
            json: serde_json::to_string(response)?,
            ports: None,
        })
    }

    /// Decode the payload as a request.
    pub fn decode_request(&self) -> Result<BridgeRequest, serde_json::Error> {
        serde_json::from_str(&self.json)
    }

    /// Decode the payload as a response.
    pub fn decode_response(&self) -> Result<BridgeResponse, serde_json::Error> {
        serde_json::from_str(&self.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_wire_format() {
        let request = BridgeRequest {
            id: 7,
            call: BridgeCall::Kill(KillParams {
                remote_id: "abc".into(),
                signal: Signal::SIGKILL,
            }),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"method\":\"kill\""));
        assert!(json.contains("\"signal\":\"SIGKILL\""));

        let envelope = Envelope::request(&request, None).unwrap();
        assert_eq!(envelope.decode_request().unwrap(), request);
    }

    #[test]
    fn test_error_field_wins() {
        let json = r#"{"id":3,"error":"no such process"}"#;
        let response: BridgeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, 3);
        assert_eq!(response.into_result().unwrap_err(), "no such process");

        let empty = BridgeResponse {
            id: 4,
            result: None,
            error: None,
        };
        assert!(empty.into_result().is_err());
    }

    #[test]
    fn test_signal_exit_codes() {
        assert_eq!(Signal::default(), Signal::SIGTERM);
        assert_eq!(Signal::SIGTERM.exit_code(), 143);
        assert_eq!(Signal::SIGKILL.exit_code(), 137);
        assert_eq!(BridgeCall::Terminate.method(), method::TERMINATE);
    }
}
