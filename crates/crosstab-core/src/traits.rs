//! Collaborator seams: the message channel and identifier generation.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raw reference to an execution context (a window, tab or process).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextRef(String);

impl ContextRef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Handle for one attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique listener id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// One inbound message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub data: String,
    /// Sender, when the channel knows it.
    pub source: Option<ContextRef>,
}

impl MessageEvent {
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn from_source(data: impl Into<String>, source: ContextRef) -> Self {
        Self {
            data: data.into(),
            source: Some(source),
        }
    }
}

/// An attached listener and the stream of events addressed to its context.
pub struct Subscription {
    pub id: ListenerId,
    pub events: BoxStream<'static, MessageEvent>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Channel error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Context unavailable: {0}")]
    Unavailable(ContextRef),
    #[error("Channel error: {0}")]
    Internal(String),
}

/// Point-to-point, best-effort, unordered string channel between contexts.
///
/// Sends are fire-and-forget: success means the payload was handed to the
/// substrate, not that anyone read it.
pub trait MessageChannel: Send + Sync {
    /// Send a payload to `target`.
    ///
    /// # Errors
    /// Returns error if the target context is gone.
    fn send(&self, target: &ContextRef, payload: String) -> Result<(), ChannelError>;

    /// Attach a listener for messages addressed to `context`.
    ///
    /// # Errors
    /// Returns error if the context cannot receive messages.
    fn subscribe(&self, context: &ContextRef) -> Result<Subscription, ChannelError>;

    /// Detach a listener. Removing a listener that is not attached is a no-op.
    fn unsubscribe(&self, listener: ListenerId);
}

/// Source of unique identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4 identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
