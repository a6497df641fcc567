//! Infrastructure layer for switchlink-plugin.
//!
//! The infrastructure layer handles all I/O: the WebSocket to the Stream Deck
//! host, WebSocket transports to game servers, and the optional config file.
//!
//! # Responsibilities
//!
//! - Connecting to the host, registering, and pumping its JSON events
//! - Opening binary WebSocket transports for the connection multiplexer
//! - Loading the TOML config file
//! - An in-memory transport so the multiplexer can run without a network
//!
//! # What does NOT belong here?
//!
//! - Reference counting, reconnects, request correlation (application layer)
//! - Message shapes (domain layer and `switchlink-core`)
//! - Command-line parsing (that is done in `main.rs`)

pub mod config_file;
pub mod host_socket;
pub mod memory;
pub mod ws_transport;

pub use config_file::{load_optional as load_config, ConfigError};
pub use host_socket::{run_host, HostConnection};
pub use memory::{MemoryConnector, MemoryPeer};
pub use ws_transport::WsConnector;
