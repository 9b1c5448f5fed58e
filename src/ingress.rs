//! Minimal websocket ingress adapter.
//!
//! Demonstrates the external contract in isolation: accept a connection,
//! parse each text frame as a JSON-encoded message, and hand it to
//! [`Dispatcher::submit`]. Connection accounting, TLS, and auth middleware
//! are intentionally absent — a production ingress would wrap this loop,
//! not replace it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::dispatcher::Dispatcher;
use crate::message::Message;

/// Wire shape of an inbound frame, before `id`/`timestamp` assignment.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    device_id: String,
    topic: String,
    /// Accepts either a base64 string or a raw JSON array of byte values.
    #[serde(with = "crate::message::payload_encoding", default)]
    payload: Vec<u8>,
    target_brokers: Vec<String>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> String {
    format!("ws-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Accept websocket connections on `addr` until `dispatcher` is shut down.
///
/// Each accepted connection is handled on its own task; a slow or hostile
/// client only ever blocks its own connection, never the dispatcher.
pub async fn serve(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    log::info!("ingress listening on {addr}");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, dispatcher).await {
                log::warn!("ingress connection from {peer} ended with error: {err}");
            }
        });
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await.context("websocket handshake failed")?;
    use futures_util::StreamExt;
    let (_sink, mut source) = ws_stream.split();

    while let Some(frame) = source.next().await {
        let frame = frame.context("websocket read error")?;
        let tokio_tungstenite::tungstenite::Message::Text(text) = frame else {
            continue;
        };

        let inbound: InboundFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(err) => {
                log::warn!("ingress: dropping malformed frame: {err}");
                continue;
            }
        };

        let message = Message {
            id: next_message_id(),
            device_id: inbound.device_id,
            timestamp: Utc::now(),
            topic: inbound.topic,
            payload: inbound.payload,
            target_brokers: inbound.target_brokers,
            source_broker: String::new(),
        };

        if !dispatcher.submit(message) {
            log::warn!("ingress: dropping message, dispatcher queue full or closed");
        }
    }

    Ok(())
}
