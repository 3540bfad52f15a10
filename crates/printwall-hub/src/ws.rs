use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use printwall_core::{Command, InitInfo, ProtocolError};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct HubState {
    labels: Vec<String>,
    feed: broadcast::Sender<String>,
}

impl HubState {
    pub fn new(labels: Vec<String>, feed: broadcast::Sender<String>) -> Self {
        Self { labels, feed }
    }

    /// The column announcement every viewer receives before any output.
    pub fn init_message(&self) -> Result<String, ProtocolError> {
        Command::InitInfo(InitInfo {
            labels: self.labels.iter().cloned().map(Some).collect(),
        })
        .encode()
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        // Subscribe before the announcement so nothing published in between is lost.
        let mut feed = self.feed.subscribe();
        let (mut ws_sender, mut ws_receiver) = socket.split();

        let init = match self.init_message() {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "init_encode_error", error = %err);
                return;
            }
        };
        if let Err(err) = ws_sender.send(Message::Text(init)).await {
            warn!(event = "viewer_send_error", remote = %remote, error = %err);
            return;
        }
        info!(event = "viewer_connected", remote = %remote, columns = self.labels.len());

        loop {
            tokio::select! {
                published = feed.recv() => {
                    match published {
                        Ok(text) => {
                            if let Err(err) = ws_sender.send(Message::Text(text)).await {
                                warn!(event = "viewer_send_error", remote = %remote, error = %err);
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(event = "viewer_lagged", remote = %remote, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            debug!(event = "viewer_message", remote = %remote, text = %text);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(event = "viewer_read_error", remote = %remote, error = %err);
                            break;
                        }
                    }
                }
            }
        }
        info!(event = "viewer_disconnected", remote = %remote);
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        hub.handle_socket(socket, addr).await;
    })
}

pub fn router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(hub)
}
