//! What the relay needs from a live connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound half of a client connection.
pub trait Transport: Send + Sync {
    /// Queue a text frame. Returns `false` if it was not accepted.
    fn send(&self, frame: Arc<String>) -> bool;

    /// Ask the connection to close. Idempotent.
    fn close(&self);
}

/// [`Transport`] feeding a WebSocket writer task.
///
/// Frames go through a bounded queue; when it is full the frame is dropped
/// and counted rather than blocking the sender.
pub struct WsTransport {
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
    dropped: AtomicU64,
}

impl WsTransport {
    /// Transport plus the receiving end for the writer task.
    pub fn new(queue: usize) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let transport = Self {
            tx,
            closed: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        };
        (transport, rx)
    }

    /// Cancelled once [`Transport::close`] is called.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Frames refused because the queue was full or the transport closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: Arc<String>) -> bool {
        if self.closed.is_cancelled() || self.tx.try_send(frame).is_err() {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
