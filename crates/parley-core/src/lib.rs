//! # parley-core
//!
//! Shared vocabulary for the parley message-routing channel:
//!
//! - **IDs**: [`ConnectionId`] (relay-assigned, process-unique) and
//!   [`SessionToken`] (client-supplied, survives reconnects by convention)
//! - **Payload**: [`Payload`], a JSON object proven free of reserved keys
//! - **Control**: [`Control`], the server-only metadata riding alongside a payload
//! - **Message**: [`Message`], the value threaded through the pipeline
//! - **Errors**: [`InboundError`] for frames rejected at the trust boundary

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod message;
pub mod payload;

pub use errors::InboundError;
pub use ids::{ConnectionId, ConnectionIdAllocator, SessionToken};
pub use message::{ADDRESS_KEY, ClientSet, Control, EventKind, Message, Sender};
pub use payload::{Payload, RESERVED_PREFIX, is_reserved_key};
