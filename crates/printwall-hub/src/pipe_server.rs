//! Worker side of the hub: accepts print-pipe connections and republishes
//! every frame as a `{cmd,val}` text message on the broadcast feed.

use printwall_core::{PipeFrame, PipeFrameDecoder};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 64 * 1024;

pub async fn serve_pipe(listener: TcpListener, feed: broadcast::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let feed = feed.clone();
                tokio::spawn(async move {
                    handle_worker(stream, remote, feed).await;
                });
            }
            Err(err) => {
                warn!(event = "pipe_accept_error", error = %err);
            }
        }
    }
}

async fn handle_worker(mut stream: TcpStream, remote: SocketAddr, feed: broadcast::Sender<String>) {
    info!(event = "worker_connected", remote = %remote);
    let mut decoder = PipeFrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                warn!(event = "worker_read_error", remote = %remote, error = %err);
                break;
            }
        };
        let report = decoder.push_chunk(&buf[..read]);
        let fatal = report.has_fatal();
        for err in &report.errors {
            warn!(event = "pipe_frame_invalid", remote = %remote, error = %err);
        }
        for frame in report.frames {
            publish(&feed, frame);
        }
        if fatal {
            warn!(event = "worker_dropped", remote = %remote);
            break;
        }
    }
    if decoder.pending_bytes() > 0 {
        debug!(event = "worker_partial_frame", remote = %remote, bytes = decoder.pending_bytes());
    }
    info!(event = "worker_disconnected", remote = %remote);
}

fn publish(feed: &broadcast::Sender<String>, frame: PipeFrame) {
    match frame.into_command().encode() {
        // No subscribers is not an error; viewers may attach later.
        Ok(text) => {
            let _ = feed.send(text);
        }
        Err(err) => warn!(event = "pipe_encode_error", error = %err),
    }
}
