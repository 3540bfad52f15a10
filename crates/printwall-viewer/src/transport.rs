//! Websocket side of the viewer. The loop owns the socket and reconnects with
//! backoff; the UI task owns all state and only sees [`StreamEvent`]s.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Connected,
    Frame(String),
    Disconnected(String),
}

pub async fn stream_loop(
    url: Url,
    tx: mpsc::Sender<StreamEvent>,
    mut outbound: mpsc::Receiver<String>,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        let (mut ws, _) = match connect_async(url.clone()).await {
            Ok(value) => value,
            Err(err) => {
                warn!("ws_connect_error: url={url} err={err}");
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = Duration::from_secs(1);
        info!("ws_connected: url={url}");
        if tx.send(StreamEvent::Connected).await.is_err() {
            return;
        }

        let reason = loop {
            tokio::select! {
                incoming = ws.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(StreamEvent::Frame(text)).await.is_err() {
                                let _ = ws.close(None).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|frame| format!("server closed: {}", frame.reason))
                                .unwrap_or_else(|| "server closed".to_string());
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            debug!("ws_binary_ignored: bytes={}", bytes.len());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break err.to_string(),
                        None => break "stream ended".to_string(),
                    }
                }
                maybe_out = outbound.recv() => {
                    let Some(text) = maybe_out else {
                        let _ = ws.close(None).await;
                        return;
                    };
                    if let Err(err) = ws.send(Message::Text(text)).await {
                        break err.to_string();
                    }
                }
            }
        };

        warn!("ws_disconnected: {reason}");
        let _ = ws.close(None).await;
        if tx.send(StreamEvent::Disconnected(reason)).await.is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}
