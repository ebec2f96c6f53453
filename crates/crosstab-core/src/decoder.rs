//! Pluggable body decoding.

use serde_json::Value;
use thiserror::Error;

/// A body that could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid data: {0}")]
pub struct DecodeError(pub String);

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Turns a raw message body into a structured value.
///
/// Implementations must be pure and fail only on malformed input.
pub trait Decoder: Send + Sync {
    /// Decode a raw body.
    ///
    /// # Errors
    /// Returns error if the body is malformed.
    fn decode(&self, raw: &str) -> Result<Value, DecodeError>;
}

/// Default decoder: standard JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl<F> Decoder for F
where
    F: Fn(&str) -> Result<Value, DecodeError> + Send + Sync,
{
    fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        self(raw)
    }
}
