//! # relay-bridge
//!
//! Thin RPC facade over the backend runtime.
//!
//! Four operations cross this boundary: `get_state`, `update_state`,
//! `send_event`, and the server-streaming `stream_events`. The runtime is
//! the authoritative owner of every partition; this crate holds no state
//! beyond the lazily opened channel handle.

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{Bridge, HttpBridgeClient};
pub use error::BridgeError;
pub use types::{BridgeAck, BridgeEvent, BridgeEventStream};
