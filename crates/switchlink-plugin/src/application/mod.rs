//! Application layer for switchlink-plugin: the connection multiplexer.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* bytes reach a server to the infrastructure layer
//! through the [`Connector`] port.
//!
//! # Responsibilities
//!
//! - Keeping exactly one shared connection per server ([`ConnectionRegistry`])
//! - Reference counting consumers and tearing idle connections down
//! - Reconnecting after unexpected closes and draining pending requests
//! - Correlating requests with responses by sequence number ([`gateway`])
//! - Fanning `entityChanged` broadcasts out to subscribed buttons
//! - Translating button lifecycle events into the above ([`SessionManager`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or WebSocket framing (that is infrastructure)
//! - JSON shapes of host messages (that is the domain layer)

pub mod connection;
pub mod error;
pub mod gateway;
pub mod pending;
pub mod ready;
pub mod registry;
pub mod session;
pub mod subscriptions;
pub mod transport;

pub use connection::{Connection, ConnectionState};
pub use error::MuxError;
pub use gateway::{request, RequestGateway};
pub use ready::GateState;
pub use registry::ConnectionRegistry;
pub use session::{host_commands_for, SessionManager};
pub use transport::{Connector, TransportLink};
