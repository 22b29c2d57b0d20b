//! Connection handlers for the Beacon server.
//!
//! This module handles the connection lifecycle: each WebSocket becomes
//! one hub connection whose inbound text frames are decoded and
//! dispatched, and whose outbound events arrive over a per-connection
//! channel and are serialized back onto the socket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use beacon_core::{ConnectionId, Hub, Store};
use beacon_protocol::codec;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The event hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over the given persistence collaborator.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self {
            hub: Hub::new(store),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, store: Arc<dyn Store>) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone(), store));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Beacon hub listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Outbound events from the hub arrive here; the hub shares one Arc
    // per emission across all target connections.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.hub.connect(connection_id.clone(), tx);

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Forward hub emissions to the WebSocket client
            Some(event) = rx.recv() => {
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_event(event.name(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Lenient: accept UTF-8 payloads sent as binary
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_inbound(&state, &connection_id, text).await,
                            Err(_) => {
                                warn!(connection = %connection_id, "Dropped non-UTF-8 binary frame");
                                metrics::record_error("malformed_event");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: leave rooms, unbind, broadcast offline if warranted
    state.hub.disconnect(&connection_id);

    let stats = state.hub.stats();
    metrics::set_online_users(stats.online_user_count);
    metrics::set_active_rooms(stats.room_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode one inbound text frame and dispatch it to the hub.
///
/// Malformed payloads are rejected here, at the boundary, instead of
/// handlers poking at optional fields.
async fn handle_inbound(state: &Arc<AppState>, connection_id: &ConnectionId, text: &str) {
    let start = Instant::now();

    match codec::decode(text) {
        Ok(event) => {
            metrics::record_event(event.name(), "inbound");
            state.hub.dispatch(connection_id, event).await;

            let stats = state.hub.stats();
            metrics::set_online_users(stats.online_user_count);
            metrics::set_active_rooms(stats.room_count);
        }
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Dropped malformed event");
            metrics::record_error("malformed_event");
        }
    }

    metrics::record_dispatch_latency(start.elapsed().as_secs_f64());
}
