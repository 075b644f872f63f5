//! Constants and configuration values used throughout the actor shim.

use std::time::Duration;

/// Leading topic segment for inbound requests.
pub const REQUEST_PREFIX: &str = "REQ";

/// Leading topic segment for outbound responses.
pub const RESPONSE_PREFIX: &str = "RESP";

/// Leading topic segment for artifact availability notices.
pub const SYNC_PREFIX: &str = "SYNC";

/// Recipient token matching every actor hosting the target service.
pub const BROADCAST_RECIPIENT: &str = "ALL";

/// Length of generated request identifiers.
pub const REQUEST_ID_LEN: usize = 8;

/// Largest serialized request payload echoed back inside an ACK envelope.
pub const ACK_ECHO_LIMIT: usize = 1000;

/// Default grace period granted to in-flight requests during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the channels between the shim and its transport.
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 32;

/// Default TCP port for the message bus.
pub const DEFAULT_BUS_PORT: u16 = 1883;

/// Control-line prefix a bus client uses to register a topic filter.
pub const SUBSCRIBE_COMMAND_PREFIX: &str = "#subscribe:";
