//! Connection relay, WebSocket transport, idle timeouts, and inbound sanitizing.

pub mod connection;
pub mod idle;
pub mod inbound;
pub mod relay;
pub mod session;
pub mod transport;
