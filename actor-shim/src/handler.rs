//! Handler invocation adapter.
//!
//! Normalizes the calling convention of a caller-supplied processing routine
//! so the dispatcher can invoke it uniformly. The strategy is chosen once at
//! construction and never changes per call; there is no fallback across
//! conventions after a failure, so a side-effecting handler can never be
//! invoked twice for one request.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::shim::ActorHandle;

/// Error raised by a request handler. Converted into one error RESULT by the
/// dispatcher; the adapter itself never publishes.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

type PayloadFn = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;
type PayloadIdFn = Box<dyn Fn(Value, String) -> HandlerFuture + Send + Sync>;
type PayloadActorFn = Box<dyn Fn(Value, String, ActorHandle) -> HandlerFuture + Send + Sync>;

enum Strategy {
    /// Handler sees only the request payload.
    Payload(PayloadFn),
    /// Handler sees the payload and the request id.
    PayloadWithId(PayloadIdFn),
    /// Handler additionally receives a handle to the running actor, for
    /// STATUS envelopes and sync notices.
    PayloadWithActor(PayloadActorFn),
}

/// A request handler with its invocation strategy fixed at construction.
pub struct Handler {
    strategy: Strategy,
}

impl Handler {
    /// Handler invoked with the raw payload only.
    pub fn payload_only<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            strategy: Strategy::Payload(Box::new(move |payload| -> HandlerFuture {
                Box::pin(f(payload))
            })),
        }
    }

    /// Handler invoked with `(payload, request_id)`.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            strategy: Strategy::PayloadWithId(Box::new(
                move |payload, request_id| -> HandlerFuture { Box::pin(f(payload, request_id)) },
            )),
        }
    }

    /// Handler invoked with `(payload, request_id, actor)`.
    pub fn with_actor<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, String, ActorHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            strategy: Strategy::PayloadWithActor(Box::new(
                move |payload, request_id, actor| -> HandlerFuture {
                    Box::pin(f(payload, request_id, actor))
                },
            )),
        }
    }

    /// Handler whose payload parameter is a schema type, materialized from
    /// the validated payload before invocation. A materialization failure is
    /// a handler error; the serializable result becomes the RESULT fields.
    pub fn typed<T, R, F, Fut>(f: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(T, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        Self {
            strategy: Strategy::PayloadWithId(Box::new(
                move |payload, request_id| -> HandlerFuture {
                    match serde_json::from_value::<T>(payload) {
                        Ok(typed) => {
                            let fut = f(typed, request_id);
                            Box::pin(async move { serialize_result(fut.await?) })
                        }
                        Err(e) => Box::pin(std::future::ready(Err(HandlerError::new(format!(
                            "could not materialize typed payload: {e}"
                        ))))),
                    }
                },
            )),
        }
    }

    /// Typed handler that also receives an [`ActorHandle`].
    pub fn typed_with_actor<T, R, F, Fut>(f: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(T, String, ActorHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        Self {
            strategy: Strategy::PayloadWithActor(Box::new(
                move |payload, request_id, actor| -> HandlerFuture {
                    match serde_json::from_value::<T>(payload) {
                        Ok(typed) => {
                            let fut = f(typed, request_id, actor);
                            Box::pin(async move { serialize_result(fut.await?) })
                        }
                        Err(e) => Box::pin(std::future::ready(Err(HandlerError::new(format!(
                            "could not materialize typed payload: {e}"
                        ))))),
                    }
                },
            )),
        }
    }

    /// Invoke the handler under its fixed strategy.
    pub async fn invoke(
        &self,
        payload: Value,
        request_id: &str,
        actor: &ActorHandle,
    ) -> Result<Value, HandlerError> {
        match &self.strategy {
            Strategy::Payload(f) => f(payload).await,
            Strategy::PayloadWithId(f) => f(payload, request_id.to_string()).await,
            Strategy::PayloadWithActor(f) => {
                f(payload, request_id.to_string(), actor.clone()).await
            }
        }
    }
}

fn serialize_result<R: Serialize>(result: R) -> Result<Value, HandlerError> {
    serde_json::to_value(result)
        .map_err(|e| HandlerError::new(format!("handler result not serializable: {e}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shim::ActorHandle;
    use serde::Deserialize;
    use serde_json::json;

    fn detached_actor() -> ActorHandle {
        ActorHandle::detached("myhost", "example-service")
    }

    #[tokio::test]
    async fn payload_only_strategy() {
        let handler = Handler::payload_only(|payload| async move {
            Ok(json!({"echo": payload}))
        });
        let result = handler
            .invoke(json!({"x": 1}), "req-1", &detached_actor())
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": {"x": 1}}));
    }

    #[tokio::test]
    async fn request_id_is_passed_through() {
        let handler = Handler::from_fn(|_payload, request_id| async move {
            Ok(json!({"request_id": request_id}))
        });
        let result = handler
            .invoke(json!({}), "req-2", &detached_actor())
            .await
            .unwrap();
        assert_eq!(result, json!({"request_id": "req-2"}));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Greeting {
        message: String,
    }

    #[tokio::test]
    async fn typed_strategy_materializes_payload() {
        let handler = Handler::typed(|req: Greeting, _id| async move {
            Ok(json!({"result": format!("Processed: {}", req.message)}))
        });
        let result = handler
            .invoke(json!({"message": "hi"}), "req-3", &detached_actor())
            .await
            .unwrap();
        assert_eq!(result, json!({"result": "Processed: hi"}));
    }

    #[tokio::test]
    async fn typed_strategy_fails_without_retry() {
        let handler = Handler::typed(|_req: Greeting, _id| async move {
            Ok(json!({"should": "not run"}))
        });
        let err = handler
            .invoke(json!({"wrong": true}), "req-4", &detached_actor())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("materialize"), "error: {err}");
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let handler =
            Handler::from_fn(|_payload, _id| async move { Err(HandlerError::new("boom")) });
        let err = handler
            .invoke(json!({}), "req-5", &detached_actor())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
