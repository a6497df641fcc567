//! Error type for multiplexer operations.

use switchlink_core::ProtocolError;
use thiserror::Error;

/// Why a request, a connection attempt or an inbound frame failed.
///
/// `Clone` because one failure is often delivered to many waiters at once
/// (every pending request, every task awaiting the ready gate).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MuxError {
    /// The transport could not be opened, or rejected a send.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be decoded.
    #[error("failed to decode server message: {0}")]
    Decode(#[from] ProtocolError),

    /// No response arrived before the deadline.
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the request.
    #[error("Cancelled")]
    Cancelled,

    /// The transport dropped while the request was outstanding.
    #[error("Connection closed")]
    ConnectionLost,

    /// The connection was torn down, or no connection exists for the key.
    #[error("Connection removed")]
    ConnectionRemoved,

    /// The server has no entity with the requested id.
    #[error("Entity does not exist")]
    EntityNotFound,

    /// The server answered but reported failure.
    #[error("{0}")]
    ApplicationFailure(String),
}

impl MuxError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
