//! Transport layer for crosstab contexts.
//!
//! Provides:
//! - `LocalHub` - In-process `MessageChannel` over tokio channels

pub mod local;

pub use local::{Endpoint, LocalHub};
