//! Core abstractions for host/guest tab sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `WireMessage` - Prefix-discriminated wire format
//! - `TabInfo` / `Handoff` - Guest identity and the side-channel handoff
//! - `TabStorage` - Host-pushed key/value bridge
//! - `Decoder`, `MessageChannel` and `IdGenerator` seams

pub mod decoder;
pub mod storage;
pub mod tab;
pub mod traits;
pub mod wire;

pub use decoder::{DecodeError, Decoder, JsonDecoder};
pub use storage::TabStorage;
pub use tab::{Handoff, TabInfo};
pub use traits::{
    ChannelError, ContextRef, IdGenerator, ListenerId, MessageChannel, MessageEvent,
    Subscription, UuidGenerator,
};
pub use wire::{MessageKind, WireMessage};
