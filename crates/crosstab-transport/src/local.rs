//! In-process message channel.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use crosstab_core::{
    ChannelError, ContextRef, ListenerId, MessageChannel, MessageEvent, Subscription,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

struct Listener {
    context: ContextRef,
    tx: mpsc::UnboundedSender<MessageEvent>,
}

#[derive(Default)]
struct Inner {
    open: HashSet<ContextRef>,
    listeners: HashMap<ListenerId, Listener>,
}

/// Best-effort channel connecting contexts that live in one process.
///
/// Contexts must be registered before they can send or receive. Sending to a
/// closed or unknown context fails with [`ChannelError::Unavailable`];
/// sending to an open context with no listener silently drops the payload.
pub struct LocalHub {
    inner: RwLock<Inner>,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Open a context so it can exchange messages.
    ///
    /// # Errors
    /// Returns error if the hub state is poisoned.
    pub fn register(&self, context: &ContextRef) -> Result<(), ChannelError> {
        self.inner
            .write()
            .map_err(|e| ChannelError::Internal(e.to_string()))?
            .open
            .insert(context.clone());
        Ok(())
    }

    /// Close a context, dropping every listener attached to it.
    ///
    /// # Errors
    /// Returns error if the hub state is poisoned.
    pub fn close(&self, context: &ContextRef) -> Result<(), ChannelError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        inner.open.remove(context);
        inner.listeners.retain(|_, l| l.context != *context);
        tracing::debug!(%context, "Context closed");
        Ok(())
    }

    /// Whether `context` is registered and open.
    #[must_use]
    pub fn is_open(&self, context: &ContextRef) -> bool {
        self.inner
            .read()
            .is_ok_and(|inner| inner.open.contains(context))
    }

    /// Number of listeners attached to `context`.
    #[must_use]
    pub fn listener_count(&self, context: &ContextRef) -> usize {
        self.inner.read().map_or(0, |inner| {
            inner
                .listeners
                .values()
                .filter(|l| l.context == *context)
                .count()
        })
    }

    /// Send a payload to `target`, tagging it with `source`.
    ///
    /// # Errors
    /// Returns error if the target is not open.
    pub fn send_from(
        &self,
        source: Option<&ContextRef>,
        target: &ContextRef,
        payload: String,
    ) -> Result<(), ChannelError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        if !inner.open.contains(target) {
            return Err(ChannelError::Unavailable(target.clone()));
        }

        let event = MessageEvent {
            data: payload,
            source: source.cloned(),
        };

        let mut delivered = 0usize;
        for listener in inner.listeners.values().filter(|l| l.context == *target) {
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            tracing::debug!(%target, "No listener attached, payload dropped");
        }
        Ok(())
    }

    /// A handle on this hub that stamps `source` on everything it sends.
    #[must_use]
    pub fn endpoint(self: &Arc<Self>, source: ContextRef) -> Endpoint {
        Endpoint {
            hub: Arc::clone(self),
            source,
        }
    }
}

impl MessageChannel for LocalHub {
    fn send(&self, target: &ContextRef, payload: String) -> Result<(), ChannelError> {
        self.send_from(None, target, payload)
    }

    fn subscribe(&self, context: &ContextRef) -> Result<Subscription, ChannelError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        if !inner.open.contains(context) {
            return Err(ChannelError::Unavailable(context.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId::next();
        inner.listeners.insert(
            id,
            Listener {
                context: context.clone(),
                tx,
            },
        );

        Ok(Subscription {
            id,
            events: UnboundedReceiverStream::new(rx).boxed(),
        })
    }

    fn unsubscribe(&self, listener: ListenerId) {
        if let Ok(mut inner) = self.inner.write() {
            if inner.listeners.remove(&listener).is_none() {
                tracing::trace!(%listener, "Listener already detached");
            }
        }
    }
}

/// Hub handle with a fixed sender identity.
#[derive(Clone)]
pub struct Endpoint {
    hub: Arc<LocalHub>,
    source: ContextRef,
}

impl Endpoint {
    /// Sender identity used for every send.
    #[must_use]
    pub const fn source(&self) -> &ContextRef {
        &self.source
    }
}

impl MessageChannel for Endpoint {
    fn send(&self, target: &ContextRef, payload: String) -> Result<(), ChannelError> {
        self.hub.send_from(Some(&self.source), target, payload)
    }

    fn subscribe(&self, context: &ContextRef) -> Result<Subscription, ChannelError> {
        self.hub.subscribe(context)
    }

    fn unsubscribe(&self, listener: ListenerId) {
        self.hub.unsubscribe(listener);
    }
}
