//! Response publication: the ACK/STATUS/RESULT protocol and its dual
//! encodings.
//!
//! Every logical envelope is published twice: the full structured envelope on
//! the `JSON` topic and a single token from the status lookup table on the
//! `SYMBOLIC` topic. Responses are never dropped for a schema mismatch;
//! publish failures are logged and not retried.

use std::path::Path;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::constants::ACK_ECHO_LIMIT;
use crate::schema::SharedSchema;
use crate::topic::TopicRouter;
use crate::types::{ResponseFormat, Stage, TransportMessage};

/// Fixed mapping from envelope status to the compact symbolic token.
/// Unknown statuses map to the same default token.
pub fn symbol_for_status(status: &str) -> &'static str {
    match status {
        "received" => "📥",
        "success" => "✅",
        "error" => "❌",
        "status" => "⏳",
        "starting" => "🚀",
        "processing" => "⚙️",
        "completed" => "🎉",
        "cancelled" => "⏹️",
        _ => "❓",
    }
}

/// Builds response envelopes and emits them to the transport.
#[derive(Clone)]
pub struct ResponsePublisher {
    router: TopicRouter,
    transport_tx: mpsc::Sender<TransportMessage>,
    response_schema: Option<SharedSchema>,
}

impl ResponsePublisher {
    pub fn new(
        router: TopicRouter,
        transport_tx: mpsc::Sender<TransportMessage>,
        response_schema: Option<SharedSchema>,
    ) -> Self {
        Self {
            router,
            transport_tx,
            response_schema,
        }
    }

    /// Acknowledge receipt of a request. Small request payloads are echoed
    /// back inside the envelope.
    pub async fn publish_ack(&self, request_id: &str, request: &Value) {
        let mut envelope = self.envelope("received", request_id);
        let echoes = serde_json::to_string(request)
            .map(|s| s.len() < ACK_ECHO_LIMIT)
            .unwrap_or(false);
        if echoes {
            envelope.insert("request".to_string(), request.clone());
        }
        self.publish(Stage::Ack, request_id, envelope).await;
    }

    /// Terminal success RESULT carrying the handler's result fields.
    pub async fn publish_success(&self, request_id: &str, result: Value) {
        let mut envelope = self.envelope("success", request_id);
        merge_fields(&mut envelope, result);
        self.publish(Stage::Result, request_id, envelope).await;
    }

    /// Terminal error RESULT.
    pub async fn publish_error(&self, request_id: &str, error_message: &str) {
        let mut envelope = self.envelope("error", request_id);
        envelope.insert("error".to_string(), json!(error_message));
        self.publish(Stage::Result, request_id, envelope).await;
    }

    /// Progress STATUS, emitted by handlers while running.
    pub async fn publish_status(&self, request_id: &str, fields: Value) {
        let mut envelope = self.envelope("status", request_id);
        merge_fields(&mut envelope, fields);
        self.publish(Stage::Status, request_id, envelope).await;
    }

    /// Side-channel notice that an artifact became available. Independent of
    /// the ACK/STATUS/RESULT protocol.
    pub async fn publish_sync_notice(&self, path: &Path, session_id: Option<&str>) {
        let topic = self.router.sync_topic();
        let payload = match session_id {
            Some(session_id) => format!("{session_id}:{}", path.display()),
            None => path.display().to_string(),
        };
        info!(%topic, %payload, "publishing sync notice");
        self.send(topic, payload).await;
    }

    /// Envelope skeleton common to every stage.
    fn envelope(&self, status: &str, request_id: &str) -> Map<String, Value> {
        let identity = self.router.identity();
        let mut fields = Map::new();
        fields.insert("status".to_string(), json!(status));
        fields.insert(
            "timestamp".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        fields.insert("hostname".to_string(), json!(identity.hostname));
        fields.insert("request_id".to_string(), json!(request_id));
        fields.insert("service".to_string(), json!(identity.service_name));
        fields
    }

    /// Emit the JSON and SYMBOLIC artifacts for one logical envelope.
    async fn publish(&self, stage: Stage, request_id: &str, mut envelope: Map<String, Value>) {
        if let Some(schema) = &self.response_schema {
            match schema.validate(&Value::Object(envelope.clone())) {
                Ok(Value::Object(normalized)) => envelope = normalized,
                Ok(other) => {
                    debug!("response schema produced a non-object ({other:?}), keeping envelope");
                }
                Err(e) => {
                    // Fall back to the unvalidated envelope rather than drop it.
                    error!("response validation failed: {e}");
                }
            }
        }

        let status = envelope
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        match serde_json::to_string_pretty(&envelope) {
            Ok(payload) => {
                let topic = self
                    .router
                    .response_topic(request_id, stage, ResponseFormat::Json);
                self.send(topic, payload).await;
            }
            Err(e) => error!(%request_id, "failed to serialize response envelope: {e}"),
        }

        let topic = self
            .router
            .response_topic(request_id, stage, ResponseFormat::Symbolic);
        self.send(topic, symbol_for_status(&status).to_string()).await;
    }

    /// One publish attempt; failures are logged, never retried.
    async fn send(&self, topic: String, payload: String) {
        debug!(%topic, "publishing");
        if let Err(e) = self
            .transport_tx
            .send(TransportMessage { topic, payload })
            .await
        {
            error!("failed to publish response: {e}");
        }
    }
}

/// Merge stage-specific fields into the envelope. Handler-supplied fields win
/// on key conflict; a non-object value is wrapped under a `result` key.
fn merge_fields(envelope: &mut Map<String, Value>, fields: Value) {
    match fields {
        Value::Object(map) => envelope.extend(map),
        Value::Null => {}
        other => {
            envelope.insert("result".to_string(), other);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::{MessageSchema, ValidationError};
    use crate::types::ActorIdentity;
    use serde_json::json;
    use std::sync::Arc;

    fn publisher(
        response_schema: Option<SharedSchema>,
    ) -> (ResponsePublisher, mpsc::Receiver<TransportMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let router = TopicRouter::new(ActorIdentity::new("myhost", "example-service"));
        (ResponsePublisher::new(router, tx, response_schema), rx)
    }

    #[tokio::test]
    async fn every_envelope_yields_two_artifacts() {
        let (publisher, mut rx) = publisher(None);
        publisher.publish_ack("abc123", &json!({"message": "hi"})).await;

        let json_artifact = rx.recv().await.unwrap();
        assert_eq!(
            json_artifact.topic,
            "RESP/myhost/example-service/abc123/ACK/JSON"
        );
        let envelope: Value = serde_json::from_str(&json_artifact.payload).unwrap();
        assert_eq!(envelope["status"], "received");
        assert_eq!(envelope["hostname"], "myhost");
        assert_eq!(envelope["service"], "example-service");
        assert_eq!(envelope["request_id"], "abc123");
        assert_eq!(envelope["request"], json!({"message": "hi"}));

        let symbolic = rx.recv().await.unwrap();
        assert_eq!(
            symbolic.topic,
            "RESP/myhost/example-service/abc123/ACK/SYMBOLIC"
        );
        assert_eq!(symbolic.payload, "📥");
    }

    #[tokio::test]
    async fn oversized_request_is_not_echoed() {
        let (publisher, mut rx) = publisher(None);
        let big = json!({"blob": "x".repeat(ACK_ECHO_LIMIT)});
        publisher.publish_ack("abc123", &big).await;

        let envelope: Value = serde_json::from_str(&rx.recv().await.unwrap().payload).unwrap();
        assert!(envelope.get("request").is_none());
    }

    #[tokio::test]
    async fn handler_fields_override_envelope_defaults() {
        let (publisher, mut rx) = publisher(None);
        publisher
            .publish_success("abc123", json!({"status": "completed", "result": "done"}))
            .await;

        let envelope: Value = serde_json::from_str(&rx.recv().await.unwrap().payload).unwrap();
        assert_eq!(envelope["status"], "completed");
        assert_eq!(envelope["result"], "done");

        // The symbolic token follows the final status.
        assert_eq!(rx.recv().await.unwrap().payload, "🎉");
    }

    #[tokio::test]
    async fn unknown_status_maps_to_default_token() {
        let (publisher, mut rx) = publisher(None);
        publisher
            .publish_status("abc123", json!({"status": "reticulating"}))
            .await;

        let _json_artifact = rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, "❓");
    }

    struct RejectEverything;

    impl MessageSchema for RejectEverything {
        fn validate(&self, _raw: &Value) -> Result<Value, ValidationError> {
            Err(ValidationError::new("nope"))
        }
    }

    #[tokio::test]
    async fn schema_failure_still_publishes_envelope() {
        let (publisher, mut rx) = publisher(Some(Arc::new(RejectEverything)));
        publisher.publish_error("abc123", "it broke").await;

        let envelope: Value = serde_json::from_str(&rx.recv().await.unwrap().payload).unwrap();
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error"], "it broke");
        assert_eq!(rx.recv().await.unwrap().payload, "❌");
    }

    #[tokio::test]
    async fn sync_notice_payload_shapes() {
        let (publisher, mut rx) = publisher(None);
        publisher
            .publish_sync_notice(Path::new("/tmp/out.json"), None)
            .await;
        publisher
            .publish_sync_notice(Path::new("/tmp/out.json"), Some("sess-1"))
            .await;

        let plain = rx.recv().await.unwrap();
        assert_eq!(plain.topic, "SYNC/myhost@myhost:");
        assert_eq!(plain.payload, "/tmp/out.json");
        assert_eq!(rx.recv().await.unwrap().payload, "sess-1:/tmp/out.json");
    }
}
