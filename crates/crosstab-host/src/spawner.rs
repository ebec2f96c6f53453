//! Context spawning seam.

use async_trait::async_trait;
use crosstab_core::ContextRef;
use thiserror::Error;

/// What the host asks for when opening a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Where the guest loads from.
    pub url: String,
    /// Side-channel string the guest reads at construction.
    pub side_channel: String,
    /// Opaque presentation hints passed through to the spawner.
    pub features: Option<String>,
}

/// Spawn error.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Spawn refused by environment")]
    Blocked,
    #[error("Spawn failed: {0}")]
    Failed(String),
}

/// Opens new guest contexts.
///
/// Implement this for the environment the host runs in (browser windows,
/// child processes, in-process tasks).
#[async_trait]
pub trait ContextSpawner: Send + Sync {
    /// Open a context and attach the side-channel before it starts.
    ///
    /// # Errors
    /// Returns error if the context could not be opened.
    async fn spawn(&self, request: &SpawnRequest) -> Result<ContextRef, SpawnError>;
}
