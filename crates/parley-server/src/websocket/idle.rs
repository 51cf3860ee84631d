//! Idle timeout for a single connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionRecord;

/// How the idle watcher ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleResult {
    /// No inbound traffic for the whole window; the transport was closed.
    TimedOut,
    /// Stopped externally (connection closed or server shutting down).
    Cancelled,
}

/// Sleep until `timeout` after the last inbound frame, re-arming whenever
/// traffic arrived in the meantime. Closes the transport on expiry.
pub async fn run_idle_watch(
    record: Arc<ConnectionRecord>,
    timeout: Duration,
    cancel: CancellationToken,
) -> IdleResult {
    loop {
        let deadline = record.last_activity() + timeout;
        tokio::select! {
            () = time::sleep_until(deadline) => {
                if record.idle_for() >= timeout {
                    record.transport().close();
                    return IdleResult::TimedOut;
                }
            }
            () = cancel.cancelled() => return IdleResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::transport::WsTransport;
    use parley_core::ConnectionId;

    fn record() -> (Arc<ConnectionRecord>, CancellationToken) {
        let (t, _rx) = WsTransport::new(4);
        let closed = t.close_token();
        let rec = ConnectionRecord::new(ConnectionId::from_raw(1), Arc::new(t), CancellationToken::new());
        (Arc::new(rec), closed)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out() {
        let (rec, closed) = record();
        let result = run_idle_watch(rec, Duration::from_secs(300), CancellationToken::new()).await;
        assert_eq!(result, IdleResult::TimedOut);
        assert!(closed.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_postpones_timeout() {
        let (rec, closed) = record();
        let watch = tokio::spawn(run_idle_watch(
            rec.clone(),
            Duration::from_secs(10),
            CancellationToken::new(),
        ));

        for _ in 0..5 {
            time::sleep(Duration::from_secs(8)).await;
            rec.touch();
        }
        assert!(!closed.is_cancelled());

        assert_eq!(watch.await.unwrap(), IdleResult::TimedOut);
        assert!(rec.idle_for() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_watch() {
        let (rec, closed) = record();
        let cancel = CancellationToken::new();
        let watch = tokio::spawn(run_idle_watch(rec, Duration::from_secs(10), cancel.clone()));
        cancel.cancel();
        assert_eq!(watch.await.unwrap(), IdleResult::Cancelled);
        assert!(!closed.is_cancelled());
    }
}
