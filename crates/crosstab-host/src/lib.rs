//! Host-side inventory of spawned guest contexts.
//!
//! Provides:
//! - `TabInventory` - Create guests, answer handshakes, push data
//! - `ContextSpawner` - Seam for whatever actually opens a context

pub mod inventory;
pub mod spawner;
pub mod tab;

pub use inventory::{HostEvent, InventoryError, TabInventory};
pub use spawner::{ContextSpawner, SpawnError, SpawnRequest};
pub use tab::{Tab, TabConfig, TabFilter, TabStatus};
