//! Core message and identity types shared across the shim.

use serde::{Deserialize, Serialize};
use tracing::error;

/// One pub/sub message as carried by the transport.
///
/// This is also the wire frame between the shim and the bus: one
/// newline-delimited JSON object per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// UTF-8 payload. Request and JSON-response payloads are JSON text;
    /// symbolic-response and sync payloads are plain tokens.
    pub payload: String,
}

/// Lifecycle stage of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Receipt acknowledgement, published before the handler runs.
    Ack,
    /// Progress update emitted by the handler while running.
    Status,
    /// Terminal outcome, success or error. Exactly one per request.
    Result,
}

impl Stage {
    /// Topic segment for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ack => "ACK",
            Stage::Status => "STATUS",
            Stage::Result => "RESULT",
        }
    }
}

/// Encoding of one published response artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Full structured envelope.
    Json,
    /// Single token derived from the envelope status.
    Symbolic,
}

impl ResponseFormat {
    /// Topic segment for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Json => "JSON",
            ResponseFormat::Symbolic => "SYMBOLIC",
        }
    }
}

/// Identity of one actor instance, fixed for the process lifetime.
///
/// Determines which request topics the actor subscribes to and which
/// response topics it publishes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub hostname: String,
    pub service_name: String,
}

impl ActorIdentity {
    pub fn new(hostname: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            service_name: service_name.into(),
        }
    }
}

/// Resolve the local hostname used for topic addressing.
pub fn local_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            error!("failed to resolve hostname: {e}");
            "unknown-host".to_string()
        }
    }
}
