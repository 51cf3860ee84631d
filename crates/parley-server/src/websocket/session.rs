//! One WebSocket client, from upgrade to close.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::relay::Relay;
use super::transport::{Transport, WsTransport};

/// How long the writer gets to flush a close frame.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Drive a connected socket.
///
/// 1. Registers a [`WsTransport`] with the relay
/// 2. Forwards queued outbound frames from a writer task
/// 3. Hands inbound text (and UTF-8 binary) frames to the relay
/// 4. Ends when the client closes, the transport is closed (idle timeout),
///    or the server shuts down, then tells the relay
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    socket: WebSocket,
    relay: Arc<Relay>,
    send_queue: usize,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (transport, mut outbound) = WsTransport::new(send_queue);
    let closing = transport.close_token();
    let transport = Arc::new(transport);

    let Some(id) = relay.receive_connection(transport.clone()).await else {
        return;
    };
    let _ = tracing::Span::current().record("conn_id", id.as_u64());

    let writer_closing = closing.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_closing.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => relay.receive_frame(id, text.as_str()).await,
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => relay.receive_frame(id, text).await,
                    Err(_) => {
                        relay.touch(id);
                        warn!(conn_id = %id, len = data.len(), "non-UTF-8 binary frame dropped");
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => relay.touch(id),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id = %id, "client closed");
                    break;
                }
                Some(Err(err)) => {
                    debug!(conn_id = %id, error = %err, "socket error");
                    break;
                }
            },
            () = closing.cancelled() => break,
            () = shutdown.cancelled() => break,
        }
    }

    relay.connection_closed(id).await;
    transport.close();
    let dropped = transport.drop_count();
    if dropped > 0 {
        warn!(conn_id = %id, dropped, "outbound frames dropped");
    }
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        debug!(conn_id = %id, "writer did not finish in time");
    }
}
