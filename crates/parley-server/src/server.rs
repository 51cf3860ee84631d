//! `ParleyServer`: axum HTTP + WebSocket surface around one relay/channel pair.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use parley_channel::{Channel, ChannelHandle, spawn_channel};
use parley_settings::ChannelSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::relay::{Relay, RelayConfig};
use crate::websocket::session::run_ws_session;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection relay.
    pub relay: Arc<Relay>,
    /// Root shutdown token.
    pub shutdown: CancellationToken,
    /// When the server was built.
    pub start_time: Instant,
    /// Outbound frames buffered per connection.
    pub send_queue: usize,
    /// Largest accepted inbound message.
    pub max_frame_bytes: usize,
}

/// One channel served over HTTP and WebSocket.
pub struct ParleyServer {
    config: ServerConfig,
    relay: Arc<Relay>,
    channel: ChannelHandle,
    channel_task: JoinHandle<()>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ParleyServer {
    /// Build the relay and channel, wire them together, and start the
    /// channel worker. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig, channel_settings: &ChannelSettings) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let relay = Arc::new(Relay::new(
            RelayConfig {
                idle_timeout: config.idle_timeout(),
                max_payload_depth: config.max_payload_depth,
            },
            shutdown.token(),
        ));
        let channel = Channel::new(channel_settings, relay.clone());
        let (handle, channel_task) = spawn_channel(channel, config.channel_queue);
        let _ = relay.attach(handle.clone());

        Self {
            config,
            relay,
            channel: handle,
            channel_task,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Routes: `GET /ws` and `GET /health`.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: self.shutdown.token(),
            start_time: self.start_time,
            send_queue: self.config.send_queue,
            max_frame_bytes: self.config.max_frame_bytes,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background until shutdown.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(%local, "parley server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(source) = served {
                error!(error = %ServerError::Serve { addr: local, source }, "server stopped");
            }
        });
        Ok((local, handle))
    }

    /// Close every connection, stop accepting, and wait for `tasks`.
    pub async fn stop(&self, tasks: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        info!(connections = self.relay.connection_count(), "shutting down");
        self.relay.close_all();
        self.shutdown.graceful_shutdown(tasks, timeout).await;
        self.channel_task.abort();
    }

    /// Connection relay.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Handle to the channel worker.
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| {
            run_ws_session(socket, state.relay, state.send_queue, state.shutdown)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let users = match state.relay.channel() {
        Some(channel) => channel.user_count().await.ok(),
        None => None,
    };
    Json(health::health_check(
        state.start_time,
        state.relay.connection_count(),
        state.relay.approved_count(),
        users,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> ParleyServer {
        ParleyServer::new(ServerConfig::default(), &ChannelSettings::default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn health_endpoint_reports_counters() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["approved_connections"], 0);
        assert_eq!(body["users"], 0);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_refused() {
        let server = make_server();
        let (status, _) = get_json(server.router(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get_json(server.router(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn relay_is_attached_on_construction() {
        let server = make_server();
        assert!(server.relay().channel().is_some());
        assert_eq!(server.channel().user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.stop(vec![handle], Some(Duration::from_secs(2))).await;
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = ParleyServer::new(
            ServerConfig {
                port: taken.local_addr().unwrap().port(),
                ..ServerConfig::default()
            },
            &ChannelSettings::default(),
        );
        assert!(matches!(server.listen().await, Err(ServerError::Bind { .. })));
    }
}
