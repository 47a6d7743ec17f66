//! WebSocket transport endpoint
//!
//! Streams one client at a time on the configured route, the newest
//! connection taking over, and forwards each binary message to the active
//! audio session.

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{ServerHandle, TransportServer, TransportState};
