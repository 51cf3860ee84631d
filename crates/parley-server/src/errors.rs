//! Server startup and serving errors.

use std::net::SocketAddr;

/// Failures starting or running the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The bound socket has no local address.
    #[error("listener has no local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// The accept loop failed.
    #[error("server on {addr} stopped with an error: {source}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_message_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:1: in use");
    }

    #[test]
    fn serve_keeps_source() {
        use std::error::Error as _;
        let err = ServerError::Serve {
            addr: "127.0.0.1:9".parse().unwrap(),
            source: std::io::Error::other("boom"),
        };
        assert!(err.source().is_some());
    }
}
