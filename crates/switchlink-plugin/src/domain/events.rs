//! Consumer identity and the events the multiplexer reports outward.

use std::fmt;

use serde::{Deserialize, Serialize};
use switchlink_core::DisplayState;

/// Opaque identifier of one UI control (a Stream Deck button context).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Something the host should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    /// The entity behind `consumer` now has this display state.
    StateChanged {
        consumer: ConsumerId,
        state: DisplayState,
    },
    /// A failure affecting `consumers`. An empty list means the failure is
    /// not tied to any control and is only logged.
    Error {
        consumers: Vec<ConsumerId>,
        message: String,
    },
    /// Lifecycle note for the host log.
    Log { message: String },
    /// The control's connection became ready after it was reconfigured.
    Ready { consumer: ConsumerId },
}

impl MuxEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn error(consumers: Vec<ConsumerId>, message: impl Into<String>) -> Self {
        Self::Error {
            consumers,
            message: message.into(),
        }
    }
}
