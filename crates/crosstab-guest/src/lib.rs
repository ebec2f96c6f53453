//! Guest-side session controller.
//!
//! Provides:
//! - `GuestController` - Handshake, liveness and message dispatch
//! - `GuestConfig` - Decoder, callbacks and expiry settings
//! - `HandshakeTimer` - Sliding expiry deadline

pub mod config;
pub mod controller;
pub mod timer;

pub use config::{DEFAULT_HANDSHAKE_EXPIRY, GuestConfig};
pub use controller::{DisconnectReason, GuestController, GuestError, SessionState};
pub use timer::HandshakeTimer;
