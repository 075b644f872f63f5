//! The actor shim orchestrator.
//!
//! Wires the topic router, schema validation, request registry, handler
//! adapter, and response publisher into the end-to-end request lifecycle:
//! transport frame in, ACK/STATUS/RESULT envelopes out.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::constants::{DEFAULT_SHUTDOWN_GRACE, REQUEST_ID_LEN};
use crate::handler::Handler;
use crate::publisher::ResponsePublisher;
use crate::registry::ActiveRequests;
use crate::schema::SharedSchema;
use crate::topic::{Route, TopicRouter};
use crate::types::{ActorIdentity, TransportMessage, local_hostname};

/// Configuration for one actor instance.
pub struct ActorConfig {
    /// Service name this actor answers for. Required.
    pub service_name: String,
    /// Hostname override; resolved from the system when `None`.
    pub hostname: Option<String>,
    /// Validates inbound request payloads. Absence disables the pass.
    pub request_schema: Option<SharedSchema>,
    /// Validates outbound envelopes. Absence disables the pass.
    pub response_schema: Option<SharedSchema>,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace: Duration,
    /// Network-interface hint, recorded for diagnostics only.
    pub host_interface: Option<String>,
}

impl ActorConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hostname: None,
            request_schema: None,
            response_schema: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            host_interface: None,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_request_schema(mut self, schema: SharedSchema) -> Self {
        self.request_schema = Some(schema);
        self
    }

    pub fn with_response_schema(mut self, schema: SharedSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_host_interface(mut self, interface: impl Into<String>) -> Self {
        self.host_interface = Some(interface.into());
        self
    }
}

/// Clonable handle onto a running actor. Given to handlers for STATUS
/// envelopes and sync notices, and to embedders for shutdown.
#[derive(Clone)]
pub struct ActorHandle {
    publisher: ResponsePublisher,
    registry: Arc<ActiveRequests>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ActorHandle {
    /// Emit a STATUS envelope for an in-flight request.
    pub async fn publish_status(&self, request_id: &str, fields: Value) {
        self.publisher.publish_status(request_id, fields).await;
    }

    /// Announce that an artifact became available.
    pub async fn publish_sync_notice(&self, path: impl AsRef<Path>, session_id: Option<&str>) {
        self.publisher
            .publish_sync_notice(path.as_ref(), session_id)
            .await;
    }

    /// Number of requests currently in flight.
    pub fn active_request_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Ask the actor to stop accepting requests and drain.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Handle wired to nothing, for exercising handlers in isolation.
    /// Publications are dropped.
    pub fn detached(hostname: &str, service_name: &str) -> Self {
        let (transport_tx, _transport_rx) = mpsc::channel(1);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
        let router = TopicRouter::new(ActorIdentity::new(hostname, service_name));
        Self {
            publisher: ResponsePublisher::new(router, transport_tx, None),
            registry: Arc::new(ActiveRequests::new()),
            shutdown_tx,
        }
    }
}

/// Request/response adapter over an already-connected pub/sub transport.
///
/// Consumes inbound frames from `transport_rx` and publishes responses to
/// `transport_tx`. One tokio task is spawned per in-flight request, with no
/// upper bound; admission control is deliberately absent and overload policy
/// is the embedder's concern.
pub struct ActorShim {
    router: TopicRouter,
    handler: Arc<Handler>,
    request_schema: Option<SharedSchema>,
    publisher: ResponsePublisher,
    registry: Arc<ActiveRequests>,
    transport_rx: mpsc::Receiver<TransportMessage>,
    shutdown_rx: mpsc::Receiver<()>,
    shutdown_grace: Duration,
    handle: ActorHandle,
}

impl ActorShim {
    /// Build a shim over a connected transport. The returned handle controls
    /// shutdown and is what handlers receive as their actor reference.
    pub fn new(
        config: ActorConfig,
        handler: Handler,
        transport_rx: mpsc::Receiver<TransportMessage>,
        transport_tx: mpsc::Sender<TransportMessage>,
    ) -> (Self, ActorHandle) {
        let hostname = config.hostname.unwrap_or_else(local_hostname);
        let identity = ActorIdentity::new(hostname, config.service_name);
        let router = TopicRouter::new(identity.clone());

        info!(
            "actor '{}' initialized on host '{}'",
            identity.service_name, identity.hostname
        );
        if let Some(interface) = &config.host_interface {
            info!("host interface hint: {interface}");
        }
        info!(
            "subscribing to: {}",
            router.subscription_filters().join(", ")
        );
        info!(
            "responding on: RESP/{}/{}/{{request_id}}/{{stage}}/{{format}}",
            identity.hostname, identity.service_name
        );

        let publisher = ResponsePublisher::new(router.clone(), transport_tx, config.response_schema);
        let registry = Arc::new(ActiveRequests::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = ActorHandle {
            publisher: publisher.clone(),
            registry: Arc::clone(&registry),
            shutdown_tx,
        };

        let shim = Self {
            router,
            handler: Arc::new(handler),
            request_schema: config.request_schema,
            publisher,
            registry,
            transport_rx,
            shutdown_rx,
            shutdown_grace: config.shutdown_grace,
            handle: handle.clone(),
        };
        (shim, handle)
    }

    /// Topic filters the transport should register for this actor.
    pub fn subscription_filters(&self) -> [String; 2] {
        self.router.subscription_filters()
    }

    /// Drive the actor until shutdown is requested or the transport closes,
    /// then drain in-flight requests within the grace period.
    pub async fn run(mut self) {
        info!("actor running");
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("shutdown requested, stopping request intake");
                    break;
                }
                message = self.transport_rx.recv() => match message {
                    Some(message) => {
                        self.on_inbound(&message.topic, message.payload.as_bytes()).await;
                    }
                    None => {
                        info!("transport closed, shutting down");
                        break;
                    }
                }
            }
        }

        let abandoned = self.registry.drain(self.shutdown_grace).await;
        if !abandoned.is_empty() {
            warn!(
                "{} request(s) abandoned at shutdown: {}",
                abandoned.len(),
                abandoned.join(", ")
            );
        }
        info!("actor stopped");
    }

    /// Handle one inbound transport message. Parsing, filtering, and
    /// validation run inline; handler execution is handed off to its own
    /// task so intake never blocks.
    pub async fn on_inbound(&self, topic: &str, payload: &[u8]) {
        let (recipient, request_id) = match self.router.route(topic) {
            Route::Addressed {
                recipient,
                request_id,
            } => (recipient, request_id),
            Route::NotAddressed { recipient } => {
                debug!(%topic, %recipient, "request for another host, ignoring");
                return;
            }
            Route::Malformed => {
                warn!(%topic, "ignoring message with unrecognized topic");
                return;
            }
        };

        // Reuse the requester's correlation id, or mint one before any
        // response can be needed.
        let request_id = request_id.unwrap_or_else(generate_request_id);
        info!(%topic, %recipient, %request_id, "processing request");

        let raw: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                let message = format!("invalid JSON in request: {e}");
                error!(%request_id, "{message}");
                self.publisher.publish_error(&request_id, &message).await;
                return;
            }
        };

        let validated = match &self.request_schema {
            Some(schema) => match schema.validate(&raw) {
                Ok(value) => value,
                Err(e) => {
                    let message = format!("request validation failed: {e}");
                    error!(%request_id, "{message}");
                    self.publisher.publish_error(&request_id, &message).await;
                    return;
                }
            },
            None => raw,
        };

        self.dispatch(request_id, validated).await;
    }

    /// Spawn the concurrent execution for a validated request and record it.
    async fn dispatch(&self, request_id: String, payload: Value) {
        let publisher = self.publisher.clone();
        let handler = Arc::clone(&self.handler);
        let registry = Arc::clone(&self.registry);
        let actor = self.handle.clone();
        let id = request_id.clone();

        // Gate the task on a signal sent after registry insertion, so the
        // entry is visible before the task can complete and remove it.
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = ready_rx.await;

            publisher.publish_ack(&id, &payload).await;

            let outcome = AssertUnwindSafe(handler.invoke(payload, &id, &actor))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(result)) => {
                    publisher.publish_success(&id, result).await;
                }
                Ok(Err(e)) => {
                    error!(request_id = %id, "handler failed: {e}");
                    publisher
                        .publish_error(&id, &format!("error during request processing: {e}"))
                        .await;
                }
                Err(_) => {
                    error!(request_id = %id, "handler panicked");
                    publisher
                        .publish_error(&id, "handler panicked during request processing")
                        .await;
                }
            }

            registry.remove(&id);
        });

        if self.registry.insert(&request_id, task).is_some() {
            warn!(%request_id, "duplicate request id, previous execution no longer tracked");
        }
        let _ = ready_tx.send(());
    }
}

/// Fixed-length identifier, collision-resistant within a registry lifetime.
fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()[..REQUEST_ID_LEN].to_string()
}
