//! Connection handlers for Courier server.
//!
//! This module handles the connection lifecycle, the HTTP gateway and the
//! health endpoint. Each WebSocket runs on its own task that feeds inbound
//! frames to the hub and drains the connection's outbox to the socket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::store;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use courier_core::{
    outbox, ConnectionId, Delivery, FrameOutcome, Gateway, HeartbeatMonitor, Hub,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// The hub.
    pub hub: Arc<Hub>,
    /// Gateway onto the hub.
    pub gateway: Gateway,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state around a hub.
    #[must_use]
    pub fn new(config: Config, hub: Arc<Hub>) -> Self {
        Self {
            gateway: hub.gateway(),
            hub,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let user_store = store::from_config(&config.store).await?;
    let hub = Arc::new(Hub::new(user_store));
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&hub)));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let heartbeat_hub = Arc::clone(&hub);
    let heartbeat = HeartbeatMonitor::new(Arc::clone(&hub), config.heartbeat.interval())
        .with_observer(move |report| {
            metrics::record_terminations(report.terminated);
            metrics::set_hub_gauges(heartbeat_hub.stats());
        })
        .spawn();

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );
    if config.gateway.enabled {
        info!("Gateway endpoint: http://{}{}", addr, config.gateway.path);
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat.abort();
    info!("Courier server stopped");
    Ok(())
}

/// Serve on an already bound listener, without heartbeat or metrics.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler));

    if state.config.gateway.enabled {
        app = app.route(&state.config.gateway.path, post(emit_handler));
    }

    app.with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "rooms": stats.rooms,
        "online_users": stats.online_users,
    }))
}

/// Body of a gateway emit request.
#[derive(Debug, Deserialize)]
pub struct EmitRequest {
    /// Event name.
    pub event: String,
    /// Payload.
    #[serde(default)]
    pub data: Value,
    /// Target room; takes precedence over `user`.
    #[serde(default)]
    pub room: Option<Value>,
    /// Target user.
    #[serde(default)]
    pub user: Option<Value>,
}

/// Response of a gateway emit request.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmitResponse {
    /// Number of connections the event was queued for.
    pub delivered: usize,
}

/// Gateway handler: inject an event on behalf of the application.
async fn emit_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmitRequest>,
) -> Response {
    if request.event.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "event must not be empty"})),
        )
            .into_response();
    }

    let (scope, delivered) = match (&request.room, &request.user) {
        (Some(room), _) => (
            "room",
            state.gateway.to(room).emit(&request.event, &request.data),
        ),
        (None, Some(user)) => (
            "user",
            state.gateway.to_user(user).emit(&request.event, &request.data),
        ),
        (None, None) => ("all", state.gateway.emit(&request.event, &request.data)),
    };

    metrics::record_gateway_emit(scope);
    debug!(event = %request.event, scope, delivered, "Gateway emit");
    Json(EmitResponse { delivered }).into_response()
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let connections = state.hub.stats().connections;
    if connections >= state.config.limits.max_connections {
        warn!(connections, "Connection limit reached, refusing upgrade");
        metrics::record_rejection();
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (tx, mut inbox) = outbox();
    let connection_id = state.hub.connect(tx);
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Deliveries queued by the hub
            delivery = inbox.recv() => {
                match delivery {
                    Some(Delivery::Frame(data)) => {
                        let Ok(text) = String::from_utf8(data.to_vec()) else {
                            warn!(connection = %connection_id, "Dropping non UTF-8 frame");
                            continue;
                        };
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Delivery::Ping) => {
                        if sender.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                    Some(Delivery::Close) => {
                        debug!(connection = %connection_id, "Closing terminated connection");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_frame(&state, &connection_id, text.as_bytes());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        on_frame(&state, &connection_id, &data);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.hub.mark_alive(&connection_id);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
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

    state.hub.disconnect(&connection_id);
    metrics::set_hub_gauges(state.hub.stats());

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Hand one inbound frame to the hub.
fn on_frame(state: &AppState, connection_id: &ConnectionId, data: &[u8]) {
    if data.len() > state.config.limits.max_message_size {
        trace!(connection = %connection_id, size = data.len(), "Dropping oversized frame");
        metrics::record_frame(data.len(), FrameOutcome::Dropped);
        return;
    }

    let start = Instant::now();
    let outcome = state.hub.handle_frame(connection_id, data);
    metrics::record_latency(start.elapsed().as_secs_f64());
    metrics::record_frame(data.len(), outcome);

    if outcome == FrameOutcome::Handled {
        metrics::set_hub_gauges(state.hub.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_request_shapes() {
        let request: EmitRequest =
            serde_json::from_str(r#"{"event": "new_chat", "data": {"_id": "c1"}, "user": "u1"}"#)
                .unwrap();
        assert_eq!(request.event, "new_chat");
        assert!(request.room.is_none());
        assert_eq!(request.user, Some(Value::from("u1")));

        let request: EmitRequest = serde_json::from_str(r#"{"event": "ping"}"#).unwrap();
        assert_eq!(request.data, Value::Null);
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut config = Config::default();
        config.limits.max_message_size = 8;
        let hub = Arc::new(Hub::default());
        let state = AppState::new(config, Arc::clone(&hub));

        let (tx, mut rx) = outbox();
        let id = hub.connect(tx);
        on_frame(&state, &id, br#"{"event": "setup", "data": "u1"}"#);

        assert!(rx.try_recv().is_err());
        assert!(!hub.presence().is_online("u1"));
    }
}
