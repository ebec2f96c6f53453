//! Host and guest sessions over an in-process hub.
//!
//! Run with: cargo run -p loopback-example
//!
//! Set `CROSSTAB_HANDSHAKE_EXPIRY_MS` to change the guest's expiry window and
//! `RUST_LOG=debug` to see dropped messages and silent send failures.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use crosstab_core::{ContextRef, MessageChannel};
use crosstab_guest::{DEFAULT_HANDSHAKE_EXPIRY, GuestConfig, GuestController};
use crosstab_host::{ContextSpawner, HostEvent, SpawnError, SpawnRequest, TabConfig, TabInventory};
use crosstab_transport::LocalHub;
use futures::StreamExt;
use serde_json::json;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Opens each guest as a task on the current runtime.
struct TaskSpawner {
    hub: Arc<LocalHub>,
    host: ContextRef,
    expiry: Duration,
    guests: Arc<Mutex<JoinSet<()>>>,
}

#[async_trait]
impl ContextSpawner for TaskSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> Result<ContextRef, SpawnError> {
        let reference = ContextRef::new(format!("guest:{}", request.url));
        self.hub
            .register(&reference)
            .map_err(|e| SpawnError::Failed(e.to_string()))?;

        let name = reference.clone();
        let config = GuestConfig::new()
            .handshake_expiry_limit(self.expiry)
            .on_initialize(move |ack| tracing::info!(guest = %name, %ack, "Guest initialized"))
            .on_parent_communication(|data| tracing::info!(%data, "Guest received message"))
            .on_parent_communicated_storage_data(|data| {
                tracing::info!(%data, "Guest received storage data");
            })
            .on_parent_disconnect(|| tracing::info!("Guest lost its host"));

        let mut guest = GuestController::new(
            config,
            Arc::new(self.hub.endpoint(reference.clone())),
            reference.clone(),
            self.host.clone(),
            Some(request.side_channel.as_str()),
        );
        guest.init();

        self.guests
            .lock()
            .map_err(|e| SpawnError::Failed(e.to_string()))?
            .spawn(async move {
                guest.run().await;
                tracing::info!(
                    tab = ?guest.tab_info(),
                    reason = ?guest.disconnect_reason(),
                    storage = ?guest.tab_storage_snapshot(),
                    "Guest session ended"
                );
            });

        Ok(reference)
    }
}

fn expiry_from_env() -> Duration {
    std::env::var("CROSSTAB_HANDSHAKE_EXPIRY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(DEFAULT_HANDSHAKE_EXPIRY, Duration::from_millis)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hub = Arc::new(LocalHub::new());
    let host = ContextRef::new("host");
    hub.register(&host)?;
    let mut inbox = hub.subscribe(&host)?;

    let guests = Arc::new(Mutex::new(JoinSet::new()));
    let spawner = TaskSpawner {
        hub: Arc::clone(&hub),
        host: host.clone(),
        expiry: expiry_from_env(),
        guests: Arc::clone(&guests),
    };
    let inventory = TabInventory::new(spawner, Arc::new(hub.endpoint(host)))
        .with_name("dashboard");

    let tab = inventory
        .create(
            TabConfig::new("http://localhost:3000/child.html")
                .with_name("heatmap1")
                .with_extra("theme", json!("dark")),
        )
        .await?;

    // Handshake plus the guest's echo of the acknowledgement.
    for _ in 0..2 {
        let Some(event) = inbox.events.next().await else {
            anyhow::bail!("host inbox closed");
        };
        if let HostEvent::Handshake(info) = inventory.handle_message(&event)? {
            tracing::info!(?info, "Host saw handshake");
        }
    }

    inventory.send_message(&tab.id, &json!({ "greeting": "hello from host" }))?;
    inventory.send_storage_data(&tab.id, &json!({ "key": "data", "value": 1 }))?;
    inventory.disconnect(&tab.id)?;

    let mut running = std::mem::take(
        &mut *guests
            .lock()
            .map_err(|e| anyhow::anyhow!("guest set poisoned: {e}"))?,
    );
    while let Some(result) = running.join_next().await {
        result?;
    }

    Ok(())
}
