//! switchlink-plugin library crate.
//!
//! A Stream Deck plugin whose buttons each control one smart switch on a game
//! server. Many buttons usually point at the same server, so the plugin
//! multiplexes them over one shared WebSocket per server: connections are
//! reference counted, torn down after a grace period, reconnected after
//! unexpected closes, and requests are matched to responses by sequence
//! number.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Stream Deck host (JSON over WebSocket)
//!         ↕
//! [switchlink-plugin]
//!   ├── domain/           Pure types: host messages, MuxEvent, PluginConfig
//!   ├── application/      Connection multiplexer and button sessions
//!   └── infrastructure/
//!         ├── host_socket/   Host registration and event pump
//!         ├── ws_transport/  Binary WebSocket to game servers
//!         ├── memory/        In-process transport
//!         └── config_file/   TOML config loading
//!         ↕
//! Game servers (protobuf over WebSocket, switchlink-core codec)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `switchlink-core`; it reaches the
//!   network only through the [`application::Connector`] trait.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: the connection multiplexer.
pub mod application;

/// Infrastructure layer: host socket, server transports, config file.
pub mod infrastructure;
