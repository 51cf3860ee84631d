//! # parley-server
//!
//! Network side of a parley channel:
//!
//! - [`websocket::relay::Relay`]: live connections, the approval gate, idle
//!   timeouts, and addressed or broadcast delivery
//! - [`websocket::session`]: per-socket reader and writer tasks
//! - [`server::ParleyServer`]: axum router with `/ws` and `/health`, plus
//!   graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::ParleyServer;
