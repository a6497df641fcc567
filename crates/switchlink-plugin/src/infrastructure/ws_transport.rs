//! WebSocket transport to game servers.
//!
//! [`WsConnector`] performs the client handshake with `tokio-tungstenite` and
//! then hands the connection state machine a [`TransportLink`]: two channels
//! bridged to the socket by a pair of pump tasks.
//!
//! ```text
//!  Connection ── outbound (unbounded) ──► writer task ──► ws sink
//!  Connection ◄── inbound (bounded)  ──── reader task ◄── ws stream
//! ```
//!
//! The writer ends when every outbound sender is dropped and sends a Close
//! frame on the way out. The reader ends on a Close frame, a socket error or
//! as soon as the connection stops listening, without waiting for the server
//! to answer the Close. Once both tasks are done the socket is dropped.
//! Dropping the reader's sender is what tells the connection that the
//! transport is gone.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use switchlink_core::ConnectionKey;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, warn};

use crate::application::{Connector, MuxError, TransportLink};

/// Frames buffered between the socket reader and the connection driver.
const INBOUND_CAPACITY: usize = 128;

/// Opens binary WebSocket connections to `ws://host:port`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, key: &ConnectionKey) -> Result<TransportLink, MuxError> {
        let url = key.url();
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(MuxError::transport)?;
        debug!("connection {key}: WebSocket handshake complete");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(INBOUND_CAPACITY);

        let writer_key = key.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(WsMessage::Binary(frame)).await {
                    debug!("connection {writer_key}: write failed: {e}");
                    return;
                }
            }
            // Every sender is gone: the connection was closed or replaced.
            let _ = ws_tx.send(WsMessage::Close(None)).await;
            let _ = ws_tx.close().await;
        });

        let reader_key = key.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    next = ws_rx.next() => next,
                    () = inbound_tx.closed() => {
                        debug!("connection {reader_key}: no longer read, dropping socket");
                        break;
                    }
                };
                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        debug!("connection {reader_key}: stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("connection {reader_key}: read error: {e}");
                        break;
                    }
                };
                match message {
                    WsMessage::Binary(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => {
                        debug!("connection {reader_key}: Close frame received");
                        break;
                    }
                    WsMessage::Text(text) => {
                        debug!(
                            "connection {reader_key}: ignoring {}-byte text frame",
                            text.len()
                        );
                    }
                    // Ping/Pong are answered by tungstenite itself.
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
