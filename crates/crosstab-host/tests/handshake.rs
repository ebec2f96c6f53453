//! Host and guest talking over an in-process hub.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use crosstab_core::{ContextRef, MessageChannel, Subscription};
use crosstab_guest::{DisconnectReason, GuestConfig, GuestController};
use crosstab_host::{
    ContextSpawner, HostEvent, SpawnError, SpawnRequest, TabConfig, TabInventory, TabStatus,
};
use crosstab_transport::LocalHub;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;

const LIMIT: Duration = Duration::from_millis(500);

#[derive(Debug)]
enum Signal {
    Initialized(Value),
    Message(Value),
    Storage(Value),
    Ended {
        reason: Option<DisconnectReason>,
        storage: HashMap<String, String>,
        disconnects: usize,
    },
}

struct LoopbackSpawner {
    hub: Arc<LocalHub>,
    host: ContextRef,
    signals: mpsc::UnboundedSender<Signal>,
    spawned: AtomicUsize,
}

#[async_trait]
impl ContextSpawner for LoopbackSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> Result<ContextRef, SpawnError> {
        let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = ContextRef::new(format!("guest-{n}"));
        self.hub
            .register(&reference)
            .map_err(|e| SpawnError::Failed(e.to_string()))?;

        let disconnects = Arc::new(AtomicUsize::new(0));
        let config = {
            let (init, msg, store) = (
                self.signals.clone(),
                self.signals.clone(),
                self.signals.clone(),
            );
            let counter = Arc::clone(&disconnects);
            GuestConfig::new()
                .handshake_expiry_limit(LIMIT)
                .on_initialize(move |v| {
                    let _ = init.send(Signal::Initialized(v.clone()));
                })
                .on_parent_communication(move |v| {
                    let _ = msg.send(Signal::Message(v.clone()));
                })
                .on_parent_communicated_storage_data(move |v| {
                    let _ = store.send(Signal::Storage(v.clone()));
                })
                .on_parent_disconnect(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
        };

        let mut guest = GuestController::new(
            config,
            Arc::new(self.hub.endpoint(reference.clone())),
            reference.clone(),
            self.host.clone(),
            Some(request.side_channel.as_str()),
        );
        guest.init();

        let signals = self.signals.clone();
        tokio::spawn(async move {
            guest.run().await;
            let _ = signals.send(Signal::Ended {
                reason: guest.disconnect_reason(),
                storage: guest.tab_storage_snapshot(),
                disconnects: disconnects.load(Ordering::SeqCst),
            });
        });

        Ok(reference)
    }
}

struct Harness {
    hub: Arc<LocalHub>,
    inventory: TabInventory<LoopbackSpawner>,
    host_inbox: Subscription,
    signals: mpsc::UnboundedReceiver<Signal>,
}

fn harness() -> Harness {
    let hub = Arc::new(LocalHub::new());
    let host = ContextRef::new("host");
    hub.register(&host).unwrap();
    let host_inbox = hub.subscribe(&host).unwrap();

    let (tx, signals) = mpsc::unbounded_channel();
    let spawner = LoopbackSpawner {
        hub: Arc::clone(&hub),
        host: host.clone(),
        signals: tx,
        spawned: AtomicUsize::new(0),
    };
    let inventory = TabInventory::new(spawner, Arc::new(hub.endpoint(host)));

    Harness {
        hub,
        inventory,
        host_inbox,
        signals,
    }
}

impl Harness {
    async fn host_receive(&mut self) -> HostEvent {
        let event = self.host_inbox.events.next().await.unwrap();
        self.inventory.handle_message(&event).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_session() {
    let mut h = harness();
    let tab = h
        .inventory
        .create(TabConfig::new("http://localhost:3000/child.html").with_name("heatmap1"))
        .await
        .unwrap();

    // Guest announces itself with the identity handed over the side-channel.
    let HostEvent::Handshake(info) = h.host_receive().await else {
        panic!("expected handshake");
    };
    assert_eq!(info.id, tab.id);
    assert_eq!(info.name, "heatmap1");
    assert_eq!(info.parent_name, "PARENT_TAB");

    // Host acknowledgement reaches the guest's initialize callback.
    let Some(Signal::Initialized(ack)) = h.signals.recv().await else {
        panic!("expected initialize");
    };
    assert_eq!(ack["id"], json!(tab.id));

    // Guest echo is recognized but not answered again.
    assert!(matches!(h.host_receive().await, HostEvent::Handshake(_)));
    assert!(
        h.inventory
            .get(&tab.id)
            .unwrap()
            .unwrap()
            .was_successfully_loaded
    );

    h.inventory.send_message(&tab.id, &json!({ "a": 1 })).unwrap();
    let Some(Signal::Message(data)) = h.signals.recv().await else {
        panic!("expected message");
    };
    assert_eq!(data, json!({ "a": 1 }));

    h.inventory
        .send_storage_data(&tab.id, &json!({ "key": "data", "value": 1 }))
        .unwrap();
    assert!(matches!(h.signals.recv().await, Some(Signal::Storage(_))));

    h.inventory.disconnect(&tab.id).unwrap();
    let Some(Signal::Ended {
        reason,
        storage,
        disconnects,
    }) = h.signals.recv().await
    else {
        panic!("expected end of session");
    };
    assert_eq!(reason, Some(DisconnectReason::ParentDisconnected));
    assert_eq!(storage.get("data").map(String::as_str), Some("1"));
    assert_eq!(disconnects, 1);
    assert_eq!(h.hub.listener_count(&tab.reference), 0);
    assert_eq!(
        h.inventory.get(&tab.id).unwrap().unwrap().status,
        TabStatus::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_host_times_out() {
    let mut h = harness();
    let start = tokio::time::Instant::now();
    let tab = h
        .inventory
        .create(TabConfig::new("http://localhost:3000/child.html"))
        .await
        .unwrap();

    // The host never answers the handshake.
    let Some(Signal::Ended {
        reason,
        disconnects,
        ..
    }) = h.signals.recv().await
    else {
        panic!("expected end of session");
    };

    assert_eq!(start.elapsed(), LIMIT);
    assert_eq!(reason, Some(DisconnectReason::HandshakeTimeout));
    assert_eq!(disconnects, 1);
    assert_eq!(h.hub.listener_count(&tab.reference), 0);
}

#[tokio::test(start_paused = true)]
async fn test_guest_survives_closed_host() {
    let mut h = harness();
    let tab = h
        .inventory
        .create(TabConfig::new("http://localhost:3000/child.html"))
        .await
        .unwrap();
    assert!(matches!(h.host_receive().await, HostEvent::Handshake(_)));
    assert!(matches!(h.signals.recv().await, Some(Signal::Initialized(_))));

    // Host context disappears without saying goodbye; the guest's echo and
    // any later sends fail silently and the session stays connected.
    h.hub.close(&ContextRef::new("host")).unwrap();
    h.inventory.send_message(&tab.id, "still there?").unwrap();

    let Some(Signal::Message(data)) = h.signals.recv().await else {
        panic!("expected message");
    };
    assert_eq!(data, json!("still there?"));
    assert!(h.hub.is_open(&tab.reference));
    assert_eq!(h.hub.listener_count(&tab.reference), 1);
}
