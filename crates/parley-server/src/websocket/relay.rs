//! Connection relay: the set of live connections and delivery to them.
//!
//! Per connection the relay tracks an approval flag and an idle watcher.
//! Inbound frames pass through [`decode_frame`] before anything reaches the
//! channel. Outbound messages are encoded once and handed to every approved
//! addressee; unapproved connections receive nothing at all.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use parley_channel::{ChannelHandle, ChannelSink};
use parley_core::{ConnectionId, ConnectionIdAllocator, EventKind, Message, Payload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ConnectionRecord;
use super::idle::{IdleResult, run_idle_watch};
use super::inbound::decode_frame;
use super::transport::Transport;

/// Relay tuning.
#[derive(Clone, Copy, Debug)]
pub struct RelayConfig {
    /// Close connections quiet for this long.
    pub idle_timeout: Duration,
    /// Deepest accepted inbound nesting.
    pub max_payload_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_payload_depth: 32,
        }
    }
}

/// Live connections of one channel.
pub struct Relay {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionRecord>>>,
    ids: ConnectionIdAllocator,
    channel: OnceLock<ChannelHandle>,
    config: RelayConfig,
    /// Parent of every idle watcher's token.
    shutdown: CancellationToken,
}

impl Relay {
    /// Relay with no connections; `shutdown` is the parent of every idle watcher.
    pub fn new(config: RelayConfig, shutdown: CancellationToken) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            ids: ConnectionIdAllocator::new(),
            channel: OnceLock::new(),
            config,
            shutdown,
        }
    }

    /// Wire the relay to its channel. Only the first call has an effect.
    pub fn attach(&self, channel: ChannelHandle) -> bool {
        let attached = self.channel.set(channel).is_ok();
        if !attached {
            warn!("relay already attached to a channel");
        }
        attached
    }

    /// Start tracking a connection.
    ///
    /// Returns `None` if this transport is already tracked. Otherwise the
    /// connection gets a fresh id, starts unapproved with its idle timer
    /// running, and a connect event goes to the channel.
    pub async fn receive_connection(&self, transport: Arc<dyn Transport>) -> Option<ConnectionId> {
        let record = {
            let mut connections = self.connections.write();
            if connections
                .values()
                .any(|r| Arc::ptr_eq(r.transport(), &transport))
            {
                debug!("transport already registered, ignoring");
                return None;
            }
            let id = self.ids.next();
            let record = Arc::new(ConnectionRecord::new(
                id,
                transport,
                self.shutdown.child_token(),
            ));
            let _ = connections.insert(id, record.clone());
            record
        };
        let id = record.id;
        info!(conn_id = %id, "connection opened");

        let timeout = self.config.idle_timeout;
        let cancel = record.idle_cancel().clone();
        drop(tokio::spawn(async move {
            if run_idle_watch(record, timeout, cancel).await == IdleResult::TimedOut {
                info!(conn_id = %id, timeout_ms = timeout.as_millis(), "idle timeout, closing");
            }
        }));

        self.submit(Message::from_connection(id, EventKind::Connect, Payload::new()))
            .await;
        Some(id)
    }

    /// Handle one inbound text frame.
    ///
    /// The frame counts as activity even if it is then rejected.
    pub async fn receive_frame(&self, id: ConnectionId, text: &str) {
        let Some(record) = self.get(id) else {
            debug!(conn_id = %id, "frame for unknown connection");
            return;
        };
        record.touch();

        match decode_frame(text, self.config.max_payload_depth) {
            Ok(payload) => {
                self.submit(Message::from_connection(id, EventKind::Transmit, payload))
                    .await;
            }
            Err(err) => {
                warn!(conn_id = %id, kind = err.error_kind(), error = %err, "inbound frame dropped");
            }
        }
    }

    /// Record non-data traffic (ping/pong) against the idle timer.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(record) = self.get(id) {
            record.touch();
        }
    }

    /// Release a closed connection and tell the channel.
    pub async fn connection_closed(&self, id: ConnectionId) {
        let Some(record) = self.connections.write().remove(&id) else {
            return;
        };
        record.release();
        info!(conn_id = %id, approved = record.is_approved(), age_ms = record.age().as_millis(), "connection closed");
        self.submit(Message::from_connection(id, EventKind::Disconnect, Payload::new()))
            .await;
    }

    /// Ask every open connection to close.
    pub fn close_all(&self) {
        for record in self.connections.read().values() {
            record.transport().close();
        }
    }

    /// Live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Connections allowed to receive broadcasts.
    pub fn approved_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|r| r.is_approved())
            .count()
    }

    /// Whether `id` is live and approved.
    pub fn is_approved(&self, id: ConnectionId) -> bool {
        self.get(id).is_some_and(|r| r.is_approved())
    }

    /// Attached channel, if any.
    pub fn channel(&self) -> Option<&ChannelHandle> {
        self.channel.get()
    }

    fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionRecord>> {
        self.connections.read().get(&id).cloned()
    }

    async fn submit(&self, message: Message) {
        let Some(channel) = self.channel.get() else {
            warn!(event = ?message.control.event, "relay not attached, event dropped");
            return;
        };
        if let Err(err) = channel.submit(message).await {
            warn!(error = %err, "channel unavailable, event dropped");
        }
    }
}

impl ChannelSink for Relay {
    fn approve_listener(&self, connection: ConnectionId) {
        match self.get(connection) {
            Some(record) => {
                if record.approve() {
                    debug!(conn_id = %connection, "listener approved");
                }
            }
            None => debug!(conn_id = %connection, "approve for unknown connection"),
        }
    }

    fn broadcast(&self, message: &Message) {
        let frame = Arc::new(message.to_wire().to_string());
        let addressed = message.control.to.as_deref();

        let targets: Vec<Arc<ConnectionRecord>> = self
            .connections
            .read()
            .values()
            .filter(|r| r.is_approved())
            .filter(|r| addressed.is_none_or(|ids| ids.contains(&r.id)))
            .cloned()
            .collect();

        let mut delivered = 0usize;
        for record in &targets {
            if record.transport().send(frame.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %record.id, "outbound frame dropped");
            }
        }
        debug!(
            recipients = delivered,
            addressed = addressed.is_some(),
            serial = message.control.serial,
            "broadcast"
        );
    }
}
