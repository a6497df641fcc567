//! Transport port: how a connection obtains a binary message stream.
//!
//! # Why a trait? (for beginners)
//!
//! The connection state machine should not care whether frames travel over a
//! real WebSocket or an in-memory channel. Defining a trait here and
//! implementing it in the infrastructure layer lets tests swap in a fake
//! server without touching any application code.
//!
//! A connected transport is represented as a pair of channels:
//!
//! - `outbound`: frames pushed here are sent to the server in order. Dropping
//!   every clone of the sender closes the transport.
//! - `inbound`: frames from the server. The channel ends (`recv()` returns
//!   `None`) when the transport closes for any reason.

use async_trait::async_trait;
use switchlink_core::ConnectionKey;
use tokio::sync::mpsc;

use crate::application::error::MuxError;

/// Both halves of an open transport.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
}

/// Opens transports to game servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs the handshake with the server behind `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Transport`] if the server cannot be reached or the
    /// handshake is rejected.
    async fn connect(&self, key: &ConnectionKey) -> Result<TransportLink, MuxError>;
}
