//! Tab inventory for orchestrating guest contexts.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use crosstab_core::{
    ChannelError, ContextRef, DecodeError, Handoff, IdGenerator, MessageChannel, MessageEvent,
    MessageKind, TabInfo, UuidGenerator, WireMessage, tab::DEFAULT_PARENT_NAME,
};
use serde::Serialize;
use serde_json::Value;

use crate::{ContextSpawner, SpawnError, SpawnRequest, Tab, TabConfig, TabFilter, TabStatus};

/// Inventory error.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Tab not found: {0}")]
    NotFound(String),
    #[error("Tab closed: {0}")]
    Closed(String),
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    InvalidData(#[from] DecodeError),
    #[error("Invalid tab url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Inventory error: {0}")]
    Internal(String),
}

/// Outcome of handling one message from a guest.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A guest completed (or repeated) its handshake.
    Handshake(TabInfo),
    /// A guest sent an application payload.
    Message { tab_id: String, data: Value },
    /// Unrecognized or host-bound-only message.
    Ignored,
}

/// Host-side registry of spawned guests.
pub struct TabInventory<S>
where
    S: ContextSpawner,
{
    spawner: S,
    channel: Arc<dyn MessageChannel>,
    ids: Arc<dyn IdGenerator>,
    name: String,
    tabs: RwLock<HashMap<String, Tab>>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl<S> TabInventory<S>
where
    S: ContextSpawner,
{
    /// Create an inventory for a host named `PARENT_TAB`, with UUID ids.
    #[must_use]
    pub fn new(spawner: S, channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            spawner,
            channel,
            ids: Arc::new(UuidGenerator),
            name: DEFAULT_PARENT_NAME.to_string(),
            tabs: RwLock::new(HashMap::new()),
        }
    }

    /// Use a different host name (handed to guests as their parent name).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a different identifier source.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Host name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new guest.
    ///
    /// The guest's id, name and this host's name travel on the side-channel,
    /// together with any extra fields in `config`. With
    /// `is_window_name_overridden` the handoff is also appended to the URL as
    /// the `ACROSS_TAB_CONFIG` query parameter.
    ///
    /// # Errors
    /// Returns error if the spawner fails, or if the URL must carry the
    /// handoff and is not absolute.
    pub async fn create(&self, config: TabConfig) -> Result<Tab, InventoryError> {
        let id = self.ids.generate();
        let name = config.name.clone().unwrap_or_else(|| id.clone());

        let handoff = Handoff {
            id: Some(id.clone()),
            name: Some(name.clone()),
            parent_name: Some(self.name.clone()),
            extra: config.extra,
        };

        let url = if config.is_window_name_overridden {
            handoff.append_to_url(&config.url)?
        } else {
            config.url
        };

        let request = SpawnRequest {
            url: url.clone(),
            side_channel: handoff.encode(),
            features: config.window_features,
        };
        let reference = self.spawner.spawn(&request).await?;

        let tab = Tab {
            id: id.clone(),
            name,
            url,
            reference,
            status: TabStatus::Open,
            was_successfully_loaded: false,
            created_at: now(),
        };

        self.tabs
            .write()
            .map_err(|e| InventoryError::Internal(e.to_string()))?
            .insert(id, tab.clone());

        tracing::info!(tab_id = %tab.id, reference = %tab.reference, "Tab opened");
        Ok(tab)
    }

    /// Handle one message addressed to the host.
    ///
    /// A first handshake from a guest marks it loaded and is acknowledged
    /// with the guest's own tab info; the guest's echo of that
    /// acknowledgement is not answered again.
    ///
    /// # Errors
    /// Returns error if a handshake body is malformed or names an unknown tab.
    pub fn handle_message(&self, event: &MessageEvent) -> Result<HostEvent, InventoryError> {
        let Some(message) = WireMessage::classify(&event.data) else {
            tracing::trace!("Dropping message with unknown prefix");
            return Ok(HostEvent::Ignored);
        };

        match message.kind {
            MessageKind::HandshakeWithParent => {
                let info: TabInfo =
                    serde_json::from_str(message.body()).map_err(DecodeError::from)?;
                self.acknowledge(&info)?;
                Ok(HostEvent::Handshake(info))
            }
            MessageKind::ParentCommunicated => {
                let tab_id = event
                    .source
                    .as_ref()
                    .and_then(|source| self.find_by_reference(source))
                    .unwrap_or_default();
                let body = message.body();
                let data = serde_json::from_str(body)
                    .unwrap_or_else(|_| Value::String(body.to_string()));
                Ok(HostEvent::Message { tab_id, data })
            }
            MessageKind::ParentDisconnected | MessageKind::ParentCommunicatedStorageData => {
                tracing::debug!(kind = %message.kind, "Ignoring host-bound message");
                Ok(HostEvent::Ignored)
            }
        }
    }

    /// Send an application payload to one tab, serialized as JSON.
    ///
    /// # Errors
    /// Returns error if the tab is unknown, closed or unreachable.
    pub fn send_message<T: Serialize + ?Sized>(
        &self,
        tab_id: &str,
        payload: &T,
    ) -> Result<(), InventoryError> {
        let message = WireMessage::json(MessageKind::ParentCommunicated, payload)
            .map_err(DecodeError::from)?;
        self.post(tab_id, &message)
    }

    /// Push key/value pairs into a tab's storage bridge.
    ///
    /// # Errors
    /// Returns error if the tab is unknown, closed or unreachable.
    pub fn send_storage_data<T: Serialize + ?Sized>(
        &self,
        tab_id: &str,
        items: &T,
    ) -> Result<(), InventoryError> {
        let message = WireMessage::json(MessageKind::ParentCommunicatedStorageData, items)
            .map_err(DecodeError::from)?;
        self.post(tab_id, &message)
    }

    /// Tell a tab the host is going away and mark it closed.
    ///
    /// # Errors
    /// Returns error if the tab is unknown.
    pub fn disconnect(&self, tab_id: &str) -> Result<(), InventoryError> {
        let tab = self.get(tab_id)?.ok_or_else(|| InventoryError::NotFound(tab_id.to_string()))?;
        if let Err(e) = self
            .channel
            .send(&tab.reference, WireMessage::disconnect().encode())
        {
            tracing::debug!(tab_id, "Disconnect not delivered: {e}");
        }
        self.mark_closed(tab_id)
    }

    /// Mark a tab closed without notifying it.
    ///
    /// # Errors
    /// Returns error if the tab is unknown.
    pub fn mark_closed(&self, tab_id: &str) -> Result<(), InventoryError> {
        self.update(tab_id, |tab| tab.status = TabStatus::Closed)?;
        tracing::info!(tab_id, "Tab closed");
        Ok(())
    }

    /// Get a tab by id.
    ///
    /// # Errors
    /// Returns error if the inventory lock is poisoned.
    pub fn get(&self, tab_id: &str) -> Result<Option<Tab>, InventoryError> {
        Ok(self
            .tabs
            .read()
            .map_err(|e| InventoryError::Internal(e.to_string()))?
            .get(tab_id)
            .cloned())
    }

    /// List tabs, newest first.
    ///
    /// # Errors
    /// Returns error if the inventory lock is poisoned.
    pub fn list(&self, filter: &TabFilter) -> Result<Vec<Tab>, InventoryError> {
        let tabs = self
            .tabs
            .read()
            .map_err(|e| InventoryError::Internal(e.to_string()))?;

        let mut result: Vec<Tab> = tabs.values().filter(|t| filter.matches(t)).cloned().collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        Ok(result)
    }

    fn acknowledge(&self, info: &TabInfo) -> Result<(), InventoryError> {
        let mut first = false;
        self.update(&info.id, |tab| {
            first = !tab.was_successfully_loaded;
            tab.was_successfully_loaded = true;
        })?;

        if !first {
            tracing::debug!(tab_id = %info.id, "Handshake echo received");
            return Ok(());
        }

        tracing::info!(tab_id = %info.id, "Guest handshake completed");
        let ack = WireMessage::json(MessageKind::HandshakeWithParent, info)
            .map_err(DecodeError::from)?;
        self.post(&info.id, &ack)
    }

    fn post(&self, tab_id: &str, message: &WireMessage) -> Result<(), InventoryError> {
        let tab = self.get(tab_id)?.ok_or_else(|| InventoryError::NotFound(tab_id.to_string()))?;
        if !tab.is_open() {
            return Err(InventoryError::Closed(tab.id));
        }

        match self.channel.send(&tab.reference, message.encode()) {
            Ok(()) => Ok(()),
            Err(e @ ChannelError::Unavailable(_)) => {
                self.mark_closed(tab_id)?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, tab_id: &str, f: impl FnOnce(&mut Tab)) -> Result<(), InventoryError> {
        let mut tabs = self
            .tabs
            .write()
            .map_err(|e| InventoryError::Internal(e.to_string()))?;
        let tab = tabs
            .get_mut(tab_id)
            .ok_or_else(|| InventoryError::NotFound(tab_id.to_string()))?;
        f(tab);
        Ok(())
    }

    fn find_by_reference(&self, reference: &ContextRef) -> Option<String> {
        self.tabs
            .read()
            .ok()?
            .values()
            .find(|t| t.reference == *reference)
            .map(|t| t.id.clone())
    }
}
