//! Guest session controller.
//!
//! Drives the handshake with the host, treats every inbound message as a
//! liveness signal, and routes classified messages to the configured
//! callbacks and the storage bridge.

use std::sync::Arc;

use crosstab_core::{
    ContextRef, DecodeError, Handoff, MessageChannel, MessageEvent, MessageKind, Subscription,
    TabInfo, TabStorage, WireMessage,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{GuestConfig, HandshakeTimer};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Host sent `PARENT_DISCONNECTED`.
    ParentDisconnected,
    /// Host never answered within the expiry window.
    HandshakeTimeout,
    /// Host went quiet after connecting (only with `disconnect_on_silence`).
    LivenessTimeout,
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AwaitingHandshakeAck,
    Connected,
    /// Terminal.
    Disconnected(DisconnectReason),
}

impl SessionState {
    #[must_use]
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

/// Guest controller error.
#[derive(Debug, Error)]
pub enum GuestError {
    /// An inbound body failed to decode.
    #[error(transparent)]
    InvalidData(#[from] DecodeError),
}

enum Wake {
    Inbound(Option<MessageEvent>),
    Expired,
}

/// Guest side of a host/guest session.
///
/// All handling is synchronous and single-owner; [`GuestController::next`]
/// and [`GuestController::run`] drive it from the channel and the timer.
pub struct GuestController {
    config: GuestConfig,
    channel: Arc<dyn MessageChannel>,
    identity: ContextRef,
    parent: ContextRef,
    handoff: Handoff,
    tab: TabInfo,
    state: SessionState,
    handshake_completed: bool,
    timer: HandshakeTimer,
    storage: TabStorage,
    listener: Option<Subscription>,
}

impl GuestController {
    /// Create a controller for the context `identity`, spawned by `parent`.
    ///
    /// `side_channel` is the string the host attached before the guest
    /// existed. It is read once, here; a missing or malformed value falls
    /// back to an empty handoff.
    #[must_use]
    pub fn new(
        config: GuestConfig,
        channel: Arc<dyn MessageChannel>,
        identity: ContextRef,
        parent: ContextRef,
        side_channel: Option<&str>,
    ) -> Self {
        let handoff = Handoff::decode(side_channel);
        Self::from_handoff(config, channel, identity, parent, handoff)
    }

    /// Like [`GuestController::new`], but falls back to the
    /// `ACROSS_TAB_CONFIG` query parameter of `location` when the
    /// side-channel carries no handoff.
    #[must_use]
    pub fn with_location(
        config: GuestConfig,
        channel: Arc<dyn MessageChannel>,
        identity: ContextRef,
        parent: ContextRef,
        side_channel: Option<&str>,
        location: &str,
    ) -> Self {
        let handoff = Handoff::locate(side_channel, Some(location));
        Self::from_handoff(config, channel, identity, parent, handoff)
    }

    fn from_handoff(
        config: GuestConfig,
        channel: Arc<dyn MessageChannel>,
        identity: ContextRef,
        parent: ContextRef,
        handoff: Handoff,
    ) -> Self {
        let tab = TabInfo::resolve(&handoff, &identity);

        Self {
            config,
            channel,
            identity,
            parent,
            handoff,
            tab,
            state: SessionState::Uninitialized,
            handshake_completed: false,
            timer: HandshakeTimer::new(),
            storage: TabStorage::new(),
            listener: None,
        }
    }

    /// Start the session: attach the listener, arm the expiry timer and send
    /// the handshake to the host. Calling it twice is a no-op.
    pub fn init(&mut self) {
        if self.state != SessionState::Uninitialized {
            tracing::debug!(tab_id = %self.tab.id, state = ?self.state, "Already initialized");
            return;
        }

        self.add_listeners();
        self.set_handshake_expiry();
        self.state = SessionState::AwaitingHandshakeAck;
        self.send_handshake();

        tracing::info!(
            tab_id = %self.tab.id,
            parent = %self.parent,
            "Handshake sent, awaiting host"
        );
    }

    /// (Re)attach the message listener for this context.
    pub fn add_listeners(&mut self) {
        self.remove_listeners();
        match self.channel.subscribe(&self.identity) {
            Ok(subscription) => self.listener = Some(subscription),
            Err(e) => {
                tracing::warn!(tab_id = %self.tab.id, "Failed to attach listener: {e}");
            }
        }
    }

    /// Detach the message listener. No-op when none is attached.
    pub fn remove_listeners(&mut self) {
        if let Some(subscription) = self.listener.take() {
            self.channel.unsubscribe(subscription.id);
        }
    }

    /// Arm the expiry timer for a full window, replacing any pending one.
    pub fn set_handshake_expiry(&mut self) {
        if self.state.is_disconnected() {
            return;
        }
        self.timer.reset(self.config.handshake_expiry_limit);
    }

    /// Decode a raw body with the configured decoder.
    ///
    /// # Errors
    /// Returns [`GuestError::InvalidData`] if the body is malformed.
    pub fn parse_data(&self, raw: &str) -> Result<Value, GuestError> {
        Ok(self.config.decoder.decode(raw)?)
    }

    /// Handle one inbound message event.
    ///
    /// Every event, recognized or not, resets the expiry timer first. Events
    /// arriving after the session ended are ignored. Only a session awaiting
    /// the host's answer becomes connected; before `init` the event is
    /// dispatched but the session stays uninitialized.
    ///
    /// # Errors
    /// Returns [`GuestError::InvalidData`] if the body fails to decode; the
    /// matching callback is not invoked in that case.
    pub fn on_communication(&mut self, event: &MessageEvent) -> Result<(), GuestError> {
        if let SessionState::Disconnected(reason) = self.state {
            tracing::debug!(tab_id = %self.tab.id, ?reason, "Session ended, ignoring message");
            return Ok(());
        }

        self.set_handshake_expiry();

        if self.state == SessionState::AwaitingHandshakeAck {
            tracing::info!(tab_id = %self.tab.id, "Host is alive, session connected");
            self.state = SessionState::Connected;
        }

        let Some(message) = WireMessage::classify(&event.data) else {
            tracing::trace!(tab_id = %self.tab.id, "Dropping message with unknown prefix");
            return Ok(());
        };

        match message.kind {
            MessageKind::ParentDisconnected => {
                self.disconnect(DisconnectReason::ParentDisconnected);
            }
            MessageKind::HandshakeWithParent => {
                let data = self.parse_data(message.body())?;
                self.complete_handshake(&data);
            }
            MessageKind::ParentCommunicatedStorageData => {
                let data = self.parse_data(message.body())?;
                let written = self.storage.apply(&data);
                tracing::debug!(tab_id = %self.tab.id, written, "Stored host data");
                if let Some(callback) = self.config.on_parent_communicated_storage_data.as_mut() {
                    callback(&data);
                }
            }
            MessageKind::ParentCommunicated => {
                let data = self.parse_data(message.body())?;
                if let Some(callback) = self.config.on_parent_communication.as_mut() {
                    callback(&data);
                }
            }
        }

        Ok(())
    }

    /// Handle expiry of the timer.
    ///
    /// Before the host has been heard from this ends the session. Once
    /// connected it only ends the session when `disconnect_on_silence` is set.
    pub fn on_handshake_expiry(&mut self) {
        match self.state {
            SessionState::Disconnected(_) => {}
            SessionState::Uninitialized | SessionState::AwaitingHandshakeAck => {
                self.disconnect(DisconnectReason::HandshakeTimeout);
            }
            SessionState::Connected => {
                self.timer.disarm();
                if self.config.disconnect_on_silence {
                    self.disconnect(DisconnectReason::LivenessTimeout);
                } else {
                    tracing::warn!(
                        tab_id = %self.tab.id,
                        limit = ?self.config.handshake_expiry_limit,
                        "No message from host within the expiry window"
                    );
                }
            }
        }
    }

    /// Send an application payload to the host.
    ///
    /// Strings are sent verbatim, anything else as JSON. Fire-and-forget: a
    /// host that is gone is only logged.
    pub fn send_message_to_parent<T: Serialize + ?Sized>(&self, payload: &T) {
        let body = match serde_json::to_value(payload) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(e) => {
                tracing::warn!(tab_id = %self.tab.id, "Payload is not serializable: {e}");
                return;
            }
        };
        self.post(&WireMessage::new(MessageKind::ParentCommunicated, body));
    }

    /// Guest identity snapshot.
    #[must_use]
    pub const fn tab_info(&self) -> &TabInfo {
        &self.tab
    }

    /// Stored representation of a host-pushed item.
    #[must_use]
    pub fn get_tab_storage_item(&self, key: &str) -> Option<&str> {
        self.storage.get(key)
    }

    /// Every host-pushed item.
    #[must_use]
    pub fn tab_storage_snapshot(&self) -> std::collections::HashMap<String, String> {
        self.storage.snapshot()
    }

    /// Handoff decoded from the side-channel.
    #[must_use]
    pub const fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self.state {
            SessionState::Disconnected(reason) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    #[must_use]
    pub const fn timer(&self) -> &HandshakeTimer {
        &self.timer
    }

    #[must_use]
    pub const fn parent(&self) -> &ContextRef {
        &self.parent
    }

    /// Wait for the next inbound message or timer expiry and apply it.
    ///
    /// Returns `None` once the session is disconnected, or when neither a
    /// listener nor a pending timer is left to make progress.
    pub async fn next(&mut self) -> Option<Result<(), GuestError>> {
        if self.state.is_disconnected() {
            return None;
        }

        let wake = {
            let timer = &self.timer;
            match self.listener.as_mut() {
                Some(subscription) => tokio::select! {
                    biased;
                    event = subscription.events.next() => Wake::Inbound(event),
                    () = timer.expired() => Wake::Expired,
                },
                None if timer.is_armed() => {
                    timer.expired().await;
                    Wake::Expired
                }
                None => return None,
            }
        };

        match wake {
            Wake::Inbound(Some(event)) => Some(self.on_communication(&event)),
            Wake::Inbound(None) => {
                tracing::debug!(tab_id = %self.tab.id, "Listener closed by channel");
                self.listener = None;
                Some(Ok(()))
            }
            Wake::Expired => {
                self.on_handshake_expiry();
                Some(Ok(()))
            }
        }
    }

    /// Drive the session until it ends, logging malformed messages.
    pub async fn run(&mut self) {
        while let Some(result) = self.next().await {
            if let Err(e) = result {
                tracing::warn!(tab_id = %self.tab.id, "Dropping inbound message: {e}");
            }
        }
    }

    fn complete_handshake(&mut self, data: &Value) {
        if self.handshake_completed {
            tracing::debug!(tab_id = %self.tab.id, "Repeated handshake acknowledgement");
            return;
        }
        self.handshake_completed = true;
        self.send_handshake();
        if let Some(callback) = self.config.on_initialize.as_mut() {
            callback(data);
        }
    }

    fn disconnect(&mut self, reason: DisconnectReason) {
        if self.state.is_disconnected() {
            return;
        }
        tracing::info!(tab_id = %self.tab.id, ?reason, "Session disconnected");

        self.state = SessionState::Disconnected(reason);
        self.remove_listeners();
        self.timer.disarm();
        if let Some(callback) = self.config.on_parent_disconnect.as_mut() {
            callback();
        }
    }

    fn send_handshake(&self) {
        match WireMessage::json(MessageKind::HandshakeWithParent, &self.tab) {
            Ok(message) => self.post(&message),
            Err(e) => tracing::warn!(tab_id = %self.tab.id, "Failed to encode tab info: {e}"),
        }
    }

    fn post(&self, message: &WireMessage) {
        if let Err(e) = self.channel.send(&self.parent, message.encode()) {
            tracing::debug!(tab_id = %self.tab.id, kind = %message.kind, "Send failed: {e}");
        }
    }
}

impl Drop for GuestController {
    fn drop(&mut self) {
        self.remove_listeners();
    }
}
