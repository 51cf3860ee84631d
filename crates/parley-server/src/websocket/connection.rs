//! Per-connection state owned by the relay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::ConnectionId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::transport::Transport;

/// A tracked connection: unapproved until its first identify attempt,
/// released when the transport closes.
pub struct ConnectionRecord {
    /// Relay-assigned id.
    pub id: ConnectionId,
    transport: Arc<dyn Transport>,
    approved: AtomicBool,
    connected_at: Instant,
    last_activity: Mutex<Instant>,
    /// Stops this connection's idle watcher.
    idle_cancel: CancellationToken,
}

impl ConnectionRecord {
    /// Unapproved record, active as of now.
    pub fn new(id: ConnectionId, transport: Arc<dyn Transport>, idle_cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id,
            transport,
            approved: AtomicBool::new(false),
            connected_at: now,
            last_activity: Mutex::new(now),
            idle_cancel,
        }
    }

    /// Outbound side of the connection.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Record inbound traffic.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// When the last inbound frame arrived.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Allow broadcasts. Returns `true` if this call changed the state.
    pub fn approve(&self) -> bool {
        !self.approved.swap(true, Ordering::AcqRel)
    }

    /// Whether broadcasts may reach this connection.
    pub fn is_approved(&self) -> bool {
        self.approved.load(Ordering::Acquire)
    }

    /// Time since the connection opened.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Stops the idle watcher.
    pub fn idle_cancel(&self) -> &CancellationToken {
        &self.idle_cancel
    }

    /// Stop the idle watcher.
    pub fn release(&self) {
        self.idle_cancel.cancel();
    }
}
