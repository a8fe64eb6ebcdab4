//! # relay-server
//!
//! The gateway process between many transient client connections and one
//! durable backend runtime:
//!
//! - Connection registry with group-based fan-out
//! - State-sync WebSocket channel bound to one partition per connection
//! - Generic-event WebSocket channel (subscribe / unsubscribe / publish)
//! - Supervised fan-out worker streaming runtime events to subscribers
//! - REST fallback for non-persistent clients, plus `/health`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod http;
pub mod server;
pub mod shutdown;
pub mod websocket;
