//! Relay transport: a reconnecting WebSocket client and the outbox used to
//! address frames to it.

mod backoff;
mod client;
mod outbox;

pub use backoff::{BackoffPolicy, BackoffState};
pub use client::{ConnectionState, RelayClient, RelayClientError, RelayEvent};
pub use outbox::Outbox;
