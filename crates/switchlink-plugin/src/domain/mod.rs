//! Domain layer for switchlink-plugin.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes. This makes them easy to test in isolation.
//!
//! # What belongs in the domain layer?
//!
//! - The JSON "language" spoken with the Stream Deck host
//! - Configuration structures
//! - Consumer identity and the events reported about consumers
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, socket or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod events;
pub mod host_messages;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::PluginConfig` instead of the longer path.
pub use config::{ActionConfig, MultiplexerConfig, PluginConfig, SMART_SWITCH_ACTION};
pub use events::{ConsumerId, MuxEvent};
pub use host_messages::{HostCommand, HostEvent, Registration, Settings};
