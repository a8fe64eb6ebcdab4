//! # relay-core
//!
//! Shared leaf types for the relay gateway:
//!
//! - [`Partition`] — identity of one independently synchronized unit of state
//! - [`ConnectionId`] — branded id for a live client connection
//! - [`frames`] — the JSON wire protocol spoken over WebSocket channels
//! - [`retry`] — backoff configuration and calculation for stream recovery

#![deny(unsafe_code)]

pub mod frames;
pub mod ids;
pub mod partition;
pub mod retry;

pub use frames::{DecodeError, EventClientFrame, EventServerFrame, SyncClientFrame, SyncServerFrame};
pub use ids::ConnectionId;
pub use partition::Partition;
pub use retry::BackoffConfig;
