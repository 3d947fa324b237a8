use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::ClientRegistry;

pub struct RelayState {
    pub registry: ClientRegistry,
    pub metrics: PrometheusHandle,
}

impl RelayState {
    pub fn new(registry: ClientRegistry, metrics: PrometheusHandle) -> Arc<Self> {
        Arc::new(Self { registry, metrics })
    }
}

/// Routes served on the relay port. Clients may upgrade on `/` or `/ws`.
pub fn relay_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
        .route("/debug/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Static files from `dir`; `/` resolves to `index.html`.
pub fn static_router(dir: impl AsRef<Path>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir.as_ref()))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn stats_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(state.registry.stats().await)
}

async fn metrics_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let client_id = Uuid::new_v4();
    let registration = state.registry.register(client_id).await;
    let mut rx = registration.receiver;
    info!(
        client_id = %client_id,
        active = registration.active_clients,
        "relay client connected"
    );

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        debug!(client_id = %client_id, "writer task finished");
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(frame @ (Message::Text(_) | Message::Binary(_))) => {
                let metrics = state.registry.broadcast(client_id, frame).await;
                debug!(
                    client_id = %client_id,
                    delivered = metrics.delivered,
                    evicted = metrics.closed,
                    "frame relayed"
                );
            }
            Ok(Message::Close(frame)) => {
                info!(
                    client_id = %client_id,
                    reason = ?frame.map(|f| f.reason.to_string()),
                    "client closed websocket"
                );
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "error receiving message");
                break;
            }
        }
    }

    let active = state.registry.unregister(client_id).await;
    counter!("pepper_relay_connections_closed_total", 1);
    writer.abort();
    info!(client_id = %client_id, active, "relay client disconnected");
}
