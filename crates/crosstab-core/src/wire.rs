//! Wire format shared by host and guest.
//!
//! Every payload on the channel is a single string: a discriminator prefix
//! immediately followed by the serialized body (no delimiter). Internally the
//! string is lifted into a tagged [`WireMessage`].

use serde::Serialize;

/// Message discriminators, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Host went away. No body.
    ParentDisconnected,
    /// Handshake request (guest to host) or acknowledgement (host to guest).
    HandshakeWithParent,
    /// Host pushed key/value pairs into the guest's storage bridge.
    ParentCommunicatedStorageData,
    /// Application payload.
    ParentCommunicated,
}

impl MessageKind {
    /// All kinds in the order they are matched against inbound payloads.
    ///
    /// `PARENT_COMMUNICATED` is a literal prefix of
    /// `PARENT_COMMUNICATED_STORAGE_DATA`, so the longer one must come first.
    pub const PRIORITY: [Self; 4] = [
        Self::ParentDisconnected,
        Self::HandshakeWithParent,
        Self::ParentCommunicatedStorageData,
        Self::ParentCommunicated,
    ];

    /// Literal prefix on the wire.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::ParentDisconnected => "PARENT_DISCONNECTED",
            Self::HandshakeWithParent => "HANDSHAKE_WITH_PARENT",
            Self::ParentCommunicatedStorageData => "PARENT_COMMUNICATED_STORAGE_DATA",
            Self::ParentCommunicated => "PARENT_COMMUNICATED",
        }
    }

    /// Whether this kind carries a body.
    #[must_use]
    pub const fn has_body(self) -> bool {
        !matches!(self, Self::ParentDisconnected)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A classified wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub kind: MessageKind,
    /// Raw body with the prefix stripped. Always `None` for bodiless kinds.
    pub body: Option<String>,
}

impl WireMessage {
    /// Build a message from a kind and an already-serialized body.
    #[must_use]
    pub fn new(kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: kind.has_body().then(|| body.into()),
        }
    }

    /// Build a message whose body is the JSON serialization of `value`.
    ///
    /// # Errors
    /// Returns error if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(
        kind: MessageKind,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_string(value)?))
    }

    /// The disconnect notification.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self {
            kind: MessageKind::ParentDisconnected,
            body: None,
        }
    }

    /// Classify a raw payload. First matching prefix in priority order wins;
    /// unrecognized payloads yield `None`.
    #[must_use]
    pub fn classify(raw: &str) -> Option<Self> {
        let kind = MessageKind::PRIORITY
            .into_iter()
            .find(|kind| raw.starts_with(kind.prefix()))?;

        let body = kind
            .has_body()
            .then(|| raw[kind.prefix().len()..].to_string());

        Some(Self { kind, body })
    }

    /// Body as a string slice; empty for bodiless kinds.
    #[must_use]
    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// Encode to the prefixed wire string.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.kind.prefix().len() + self.body().len());
        out.push_str(self.kind.prefix());
        out.push_str(self.body());
        out
    }
}
