//! Channel-side error types.

use parley_core::{ConnectionId, SessionToken};

/// Identity store failures. Each variant names the index that collided.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another user holds this name (case-insensitive).
    #[error("name already taken: {0}")]
    NameConflict(String),

    /// Another user holds this session token.
    #[error("session already in use: {0}")]
    SessionConflict(SessionToken),

    /// The connection already has a user.
    #[error("connection {0} already identified")]
    ConnectionConflict(ConnectionId),

    /// No user on this connection.
    #[error("no user on connection {0}")]
    NotFound(ConnectionId),
}

impl RegistryError {
    /// Short label for log fields.
    pub fn index(&self) -> &'static str {
        match self {
            Self::NameConflict(_) => "name",
            Self::SessionConflict(_) => "session",
            Self::ConnectionConflict(_) | Self::NotFound(_) => "connection",
        }
    }
}

/// Failure talking to a channel worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The worker task is gone.
    #[error("channel worker has stopped")]
    Closed,
}
