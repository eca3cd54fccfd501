//! HTTP and WebSocket API surface.
//!
//! Performs the WebSocket upgrade and hands the split socket to the monitor
//! hub as a duplex channel; the hub itself never sees the transport.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use hearth_monitor::{
    host::{host_info, HostInfo},
    process::top_processes,
    stats::ProcessInfo,
    Channel, ChannelSink, ChannelStream, Error, Hub, Inbound,
};

/// Shared handler state.
pub struct AppState {
    pub hub: Hub,
    pub process_limit: usize,
}

/// Creates the web router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Metric stream
        .route("/ws/monitor", get(monitor_ws))
        // Point-in-time queries
        .route("/api/processes", get(processes))
        .route("/api/system", get(system))
        // Dashboards are served from anywhere
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /ws/monitor - Upgrade and attach to the snapshot stream
async fn monitor_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = state.hub.join(WsChannel(socket)).await {
            warn!("Monitor client rejected: {}", e);
        }
    })
}

/// GET /api/processes - Top processes by CPU usage
async fn processes(State(state): State<Arc<AppState>>) -> Json<Vec<ProcessInfo>> {
    Json(top_processes(state.process_limit).await)
}

/// GET /api/system - Static host facts
async fn system() -> Json<HostInfo> {
    Json(host_info())
}

/// Adapter exposing an upgraded WebSocket as a monitor channel.
struct WsChannel(WebSocket);

impl Channel for WsChannel {
    type Sink = WsSink;
    type Stream = WsStream;

    fn split(self) -> (WsSink, WsStream) {
        let (sink, stream) = self.0.split();
        (WsSink(sink), WsStream(stream))
    }
}

struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ChannelSink for WsSink {
    async fn send(&mut self, frame: String) -> hearth_monitor::Result<()> {
        self.0
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

struct WsStream(SplitStream<WebSocket>);

#[async_trait]
impl ChannelStream for WsStream {
    async fn recv(&mut self) -> hearth_monitor::Result<Inbound> {
        match self.0.next().await {
            None | Some(Ok(Message::Close(_))) => Ok(Inbound::Closed),
            Some(Ok(_)) => Ok(Inbound::Activity),
            Some(Err(e)) => Err(Error::Transport(e.to_string())),
        }
    }
}
