//! Payload validation seam.
//!
//! The shim treats validation as an external capability: anything that can
//! turn an untyped JSON value into a normalized one, or fail with a message
//! the requester will see in an error RESULT. Validation is synchronous,
//! deterministic, and side-effect-free.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Validation failure reported back to the requester.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Converts an untyped payload into a normalized value or fails.
pub trait MessageSchema: Send + Sync {
    fn validate(&self, raw: &Value) -> Result<Value, ValidationError>;
}

/// Shared, dynamically-typed schema reference as carried in configuration.
pub type SharedSchema = Arc<dyn MessageSchema>;

/// Schema backed by a serde-deserializable type.
///
/// Validation deserializes the payload into `T` and serializes it back, so
/// defaults declared on `T` are filled in on the way through and serde's
/// error text (which names the offending field) becomes the validation
/// message.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Convenience constructor for configuration fields.
    pub fn shared() -> SharedSchema
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Arc::new(Self::new())
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageSchema for TypedSchema<T>
where
    T: DeserializeOwned + Serialize,
{
    fn validate(&self, raw: &Value) -> Result<Value, ValidationError> {
        let typed: T = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::new(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| ValidationError::new(e.to_string()))
    }
}
