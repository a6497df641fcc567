//! In-process transport for tests and local experiments.
//!
//! Every successful [`MemoryConnector::connect`] produces a [`MemoryPeer`]
//! on the channel returned by [`MemoryConnector::new`]. The peer plays the
//! game server: it reads the requests the multiplexer sent and answers with
//! responses or broadcasts. Dropping (or [`close`](MemoryPeer::close)-ing) a
//! peer looks to the connection exactly like the server hanging up.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use switchlink_core::{
    decode_request, encode_message, AppMessage, AppRequest, AppResponse, ConnectionKey,
    EntityId,
};
use tokio::sync::mpsc;
use tracing::warn;

use crate::application::{Connector, MuxError, TransportLink};

const PEER_CAPACITY: usize = 64;

/// [`Connector`] backed by channels instead of sockets.
#[derive(Debug)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    /// Creates a connector and the receiver its server-side peers arrive on.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refusing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// While set, every connection attempt fails with "connection refused".
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connection attempts made so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, key: &ConnectionKey) -> Result<TransportLink, MuxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(MuxError::Transport(format!(
                "connection refused by {}",
                key.url()
            )));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::channel(PEER_CAPACITY);
        let peer = MemoryPeer {
            key: key.clone(),
            to_client,
            from_client,
        };
        self.peers
            .send(peer)
            .map_err(|_| MuxError::Transport("memory server is gone".into()))?;
        Ok(TransportLink { outbound, inbound })
    }
}

/// Server side of one in-memory transport.
#[derive(Debug)]
pub struct MemoryPeer {
    pub key: ConnectionKey,
    to_client: mpsc::Sender<Vec<u8>>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryPeer {
    /// Next request the client sent, or `None` once the client hung up.
    /// Frames that are not valid requests are logged and skipped.
    pub async fn next_request(&mut self) -> Option<AppRequest> {
        loop {
            let frame = self.from_client.recv().await?;
            match decode_request(&frame) {
                Ok(request) => return Some(request),
                Err(e) => warn!("memory peer {}: bad request frame: {e}", self.key),
            }
        }
    }

    /// Sends a response. Returns `false` if the client side is gone.
    pub async fn respond(&self, response: AppResponse) -> bool {
        self.send_raw(encode_message(&AppMessage::Response(response)))
            .await
    }

    /// Sends an `entityChanged` broadcast.
    pub async fn broadcast(&self, entity_id: EntityId, value: bool) -> bool {
        self.send_raw(encode_message(&AppMessage::entity_changed(entity_id, value)))
            .await
    }

    /// Sends arbitrary bytes as one frame.
    pub async fn send_raw(&self, frame: Vec<u8>) -> bool {
        self.to_client.send(frame).await.is_ok()
    }

    /// Hangs up.
    pub fn close(self) {}
}
