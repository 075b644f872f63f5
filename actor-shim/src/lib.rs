//! Request/response actor shim over a topic-based pub/sub bus.
//!
//! Exposes arbitrary business logic as addressable network services: clients
//! publish a JSON request to `REQ/<recipient>/<service>[/<request_id>]` and
//! the actor answers with an ACK/STATUS/RESULT lifecycle on deterministic
//! `RESP/...` topics, each envelope published in both a structured JSON
//! encoding and a compact symbolic one.

use std::future::Future;

pub mod bus;
pub mod constants;
pub mod handler;
pub mod publisher;
pub mod registry;
pub mod schema;
pub mod shim;
pub mod topic;
pub mod transport;
pub mod types;

pub use handler::{Handler, HandlerError};
pub use publisher::{ResponsePublisher, symbol_for_status};
pub use registry::ActiveRequests;
pub use schema::{MessageSchema, TypedSchema, ValidationError};
pub use shim::{ActorConfig, ActorHandle, ActorShim};
pub use topic::{Route, TopicRouter, filter_matches};
pub use types::{ActorIdentity, ResponseFormat, Stage, TransportMessage};

/// A [Tokio actor][]: owns its state, runs as a spawned task, and
/// communicates with the rest of the system over channels.
///
/// [Tokio actor]: https://ryhl.io/blog/actors-with-tokio/
pub trait Actor: Send + Sized + 'static {
    /// Drive the actor to completion.
    fn run(self) -> impl Future<Output = ()> + Send;

    /// Run the actor on its own task.
    fn spawn(self) {
        tokio::spawn(self.run());
    }
}
