//! Channel worker: one task per channel, fed through an MPSC queue.
//!
//! Every message for a channel is processed on the worker task, one at a
//! time and to completion, so registry and history updates never interleave.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use parley_core::Message;

use crate::channel::Channel;
use crate::errors::ChannelError;
use crate::history::HistoryRecord;

/// Request handled by the worker.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Run a message through the pipeline.
    Receive(Message),
    /// Read history records with serials in `[first, last]`.
    Retrieve {
        first: u64,
        last: u64,
        reply: oneshot::Sender<Vec<HistoryRecord>>,
    },
    /// Number of identified users.
    UserCount { reply: oneshot::Sender<usize> },
}

/// Cloneable handle to a running channel worker.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    tx: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// Queue a message, waiting for space if the queue is full.
    pub async fn submit(&self, message: Message) -> Result<(), ChannelError> {
        self.tx
            .send(ChannelCommand::Receive(message))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// History records with serials in `[first, last]`.
    pub async fn retrieve(&self, first: u64, last: u64) -> Result<Vec<HistoryRecord>, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChannelCommand::Retrieve { first, last, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::Closed)
    }

    /// Number of identified users.
    pub async fn user_count(&self) -> Result<usize, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChannelCommand::UserCount { reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::Closed)
    }

    /// Whether the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Move `channel` onto its own task.
///
/// The task ends once every [`ChannelHandle`] has been dropped.
pub fn spawn_channel(channel: Channel, queue: usize) -> (ChannelHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue.max(1));
    let task = tokio::spawn(channel_worker(channel, rx));
    (ChannelHandle { tx }, task)
}

async fn channel_worker(mut channel: Channel, mut rx: mpsc::Receiver<ChannelCommand>) {
    debug!("channel worker started");
    while let Some(command) = rx.recv().await {
        match command {
            ChannelCommand::Receive(message) => channel.receive(message),
            ChannelCommand::Retrieve { first, last, reply } => {
                let _ = reply.send(channel.retrieve(first, last));
            }
            ChannelCommand::UserCount { reply } => {
                let _ = reply.send(channel.registry().len());
            }
        }
    }
    debug!("channel worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelSink;
    use parking_lot::Mutex;
    use parley_core::{ConnectionId, EventKind, Payload};
    use parley_settings::ChannelSettings;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSink {
        sent: Mutex<Vec<Message>>,
    }

    impl ChannelSink for CountingSink {
        fn approve_listener(&self, _: ConnectionId) {}

        fn broadcast(&self, message: &Message) {
            self.sent.lock().push(message.clone());
        }
    }

    fn identify(conn: u64, name: &str) -> Message {
        Message::from_connection(
            ConnectionId::from_raw(conn),
            EventKind::Transmit,
            Payload::from_untrusted(json!({"request": "identify", "name": name}), 8).unwrap(),
        )
    }

    #[tokio::test]
    async fn commands_are_processed_in_order() {
        let sink = Arc::new(CountingSink::default());
        let channel = Channel::new(&ChannelSettings::default(), sink.clone());
        let (handle, _task) = spawn_channel(channel, 16);

        handle.submit(identify(1, "Alice")).await.unwrap();
        handle.submit(identify(2, "Bob")).await.unwrap();

        assert_eq!(handle.user_count().await.unwrap(), 2);
        let records = handle.retrieve(0, u64::MAX).await.unwrap();
        let texts: Vec<_> = records
            .iter()
            .filter_map(|r| r.payload.get_str("text"))
            .collect();
        assert_eq!(texts, vec!["Alice joined", "Bob joined"]);
        assert!(!sink.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn concurrent_identifies_with_same_name_stay_unique() {
        let sink = Arc::new(CountingSink::default());
        let channel = Channel::new(&ChannelSettings::default(), sink);
        let (handle, _task) = spawn_channel(channel, 64);

        let mut joins = Vec::new();
        for conn in 1..=20 {
            let h = handle.clone();
            joins.push(tokio::spawn(async move { h.submit(identify(conn, "Same")).await }));
        }
        for j in joins {
            j.await.unwrap().unwrap();
        }
        assert_eq!(handle.user_count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn worker_stops_when_handles_drop() {
        let sink = Arc::new(CountingSink::default());
        let channel = Channel::new(&ChannelSettings::default(), sink);
        let (handle, task) = spawn_channel(channel, 4);
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_stop_reports_closed() {
        let sink = Arc::new(CountingSink::default());
        let channel = Channel::new(&ChannelSettings::default(), sink);
        let (handle, task) = spawn_channel(channel, 4);
        task.abort();
        let _ = task.await;
        assert!(handle.is_closed());
        assert_eq!(
            handle.submit(identify(1, "x")).await,
            Err(ChannelError::Closed)
        );
    }
}
