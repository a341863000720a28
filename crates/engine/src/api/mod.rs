//! API layer - WebSocket relay entry points.

pub mod connections;
pub mod websocket;

pub use connections::{ConnectionError, ConnectionInfo, ConnectionManager};
