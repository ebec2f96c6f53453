//! Guest controller configuration.

use std::{fmt, sync::Arc, time::Duration};

use crosstab_core::{Decoder, JsonDecoder};
use serde_json::Value;

/// Default time allowed for the host to answer before the guest gives up.
pub const DEFAULT_HANDSHAKE_EXPIRY: Duration = Duration::from_millis(5000);

/// Callback receiving a decoded payload.
pub type PayloadCallback = Box<dyn FnMut(&Value) + Send>;

/// Callback fired when the session ends.
pub type DisconnectCallback = Box<dyn FnMut() + Send>;

/// Guest configuration. Every callback is optional; an absent callback is a
/// no-op.
pub struct GuestConfig {
    pub(crate) decoder: Arc<dyn Decoder>,
    pub(crate) on_initialize: Option<PayloadCallback>,
    pub(crate) on_parent_communication: Option<PayloadCallback>,
    pub(crate) on_parent_communicated_storage_data: Option<PayloadCallback>,
    pub(crate) on_parent_disconnect: Option<DisconnectCallback>,
    pub(crate) handshake_expiry_limit: Duration,
    pub(crate) disconnect_on_silence: bool,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            decoder: Arc::new(JsonDecoder),
            on_initialize: None,
            on_parent_communication: None,
            on_parent_communicated_storage_data: None,
            on_parent_disconnect: None,
            handshake_expiry_limit: DEFAULT_HANDSHAKE_EXPIRY,
            disconnect_on_silence: false,
        }
    }
}

impl fmt::Debug for GuestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestConfig")
            .field("on_initialize", &self.on_initialize.is_some())
            .field("on_parent_communication", &self.on_parent_communication.is_some())
            .field(
                "on_parent_communicated_storage_data",
                &self.on_parent_communicated_storage_data.is_some(),
            )
            .field("on_parent_disconnect", &self.on_parent_disconnect.is_some())
            .field("handshake_expiry_limit", &self.handshake_expiry_limit)
            .field("disconnect_on_silence", &self.disconnect_on_silence)
            .finish_non_exhaustive()
    }
}

impl GuestConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the body decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Called once, with the decoded handshake acknowledgement.
    #[must_use]
    pub fn on_initialize(mut self, f: impl FnMut(&Value) + Send + 'static) -> Self {
        self.on_initialize = Some(Box::new(f));
        self
    }

    /// Called with every decoded application payload from the host.
    #[must_use]
    pub fn on_parent_communication(mut self, f: impl FnMut(&Value) + Send + 'static) -> Self {
        self.on_parent_communication = Some(Box::new(f));
        self
    }

    /// Called with every decoded storage-data body, after it is stored.
    #[must_use]
    pub fn on_parent_communicated_storage_data(
        mut self,
        f: impl FnMut(&Value) + Send + 'static,
    ) -> Self {
        self.on_parent_communicated_storage_data = Some(Box::new(f));
        self
    }

    /// Called once when the session ends, for any reason.
    #[must_use]
    pub fn on_parent_disconnect(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_parent_disconnect = Some(Box::new(f));
        self
    }

    /// How long to wait for the host before giving up.
    #[must_use]
    pub const fn handshake_expiry_limit(mut self, limit: Duration) -> Self {
        self.handshake_expiry_limit = limit;
        self
    }

    /// Also end a connected session when the host goes quiet for a full
    /// expiry window.
    #[must_use]
    pub const fn disconnect_on_silence(mut self, enabled: bool) -> Self {
        self.disconnect_on_silence = enabled;
        self
    }

    /// Configured expiry window.
    #[must_use]
    pub const fn expiry_limit(&self) -> Duration {
        self.handshake_expiry_limit
    }
}
