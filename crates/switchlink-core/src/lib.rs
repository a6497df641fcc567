//! # switchlink-core
//!
//! Shared library for switchlink containing the companion-protocol codec,
//! message types and the connection settings a smart-switch button carries.
//!
//! It has zero dependencies on network sockets or async runtimes; the
//! multiplexer in `switchlink-plugin` builds on top of it.
//!
//! # Architecture overview (for beginners)
//!
//! switchlink lets many Stream Deck buttons share a handful of WebSocket
//! connections to game servers. Each button controls one smart switch.
//!
//! - **`protocol`** – How bytes travel over the connection. Requests and
//!   server messages are encoded in the protobuf wire format and correlated by
//!   a per-connection sequence number.
//!
//! - **`domain`** – Plain value types: the parsed button settings, the key that
//!   identifies a shared connection, and the mapping from a switch's on/off
//!   value to the button's display state.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `switchlink_core::ConnectionKey` instead of the full module path.
pub use domain::settings::{
    ConnectionConfig, ConnectionKey, Credentials, EntityId, PlayerId, PlayerToken, SettingsError,
};
pub use domain::state::DisplayState;
pub use protocol::codec::{
    decode_message, decode_request, encode_message, encode_request, ProtocolError,
};
pub use protocol::messages::{AppMessage, AppRequest, AppResponse, RequestBody, Seq};
