//! JSON messages exchanged with the Stream Deck host application.
//!
//! The host talks to the plugin over a local WebSocket. Every frame is a JSON
//! object whose `"event"` field names the variant:
//!
//! ```json
//! {"event":"keyUp","action":"tech.macil.rustplus.smartswitch",
//!  "context":"A1B2","device":"D1","payload":{"settings":{},"state":1}}
//! ```
//!
//! Serde's `#[serde(tag = "event")]` handles the discriminant. Inbound fields
//! the plugin does not use (`device`, `coordinates`, ...) are ignored, and
//! unknown events decode as [`HostEvent::Other`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchlink_core::{ConnectionConfig, DisplayState};

use crate::domain::events::ConsumerId;

/// Settings key holding the button's connection config JSON.
pub const CONNECTION_CONFIG_KEY: &str = "connection-config";

/// Per-button settings persisted by the host.
pub type Settings = Map<String, Value>;

/// Extracts and parses the connection config from a settings map.
///
/// Absent, non-string or malformed values all mean "no connection".
pub fn connection_config_from(settings: &Settings) -> Option<ConnectionConfig> {
    ConnectionConfig::parse_optional(settings.get(CONNECTION_CONFIG_KEY).and_then(Value::as_str))
}

// ── Host → plugin ─────────────────────────────────────────────────────────────

/// Events the host sends to the plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// A key was released. `payload.state` is the state *before* the press.
    KeyUp {
        action: String,
        context: ConsumerId,
        payload: KeyPayload,
    },
    /// A button instance became visible with its saved settings.
    WillAppear {
        action: String,
        context: ConsumerId,
        payload: AppearancePayload,
    },
    /// A button instance is no longer visible.
    WillDisappear { action: String, context: ConsumerId },
    /// The property inspector changed a setting.
    SendToPlugin {
        action: String,
        context: ConsumerId,
        payload: SendToPluginPayload,
    },
    /// Any event this plugin does not handle.
    #[serde(other)]
    Other,
}

impl HostEvent {
    /// The action UUID the event targets, if it targets one.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::KeyUp { action, .. }
            | Self::WillAppear { action, .. }
            | Self::WillDisappear { action, .. }
            | Self::SendToPlugin { action, .. } => Some(action),
            Self::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyPayload {
    #[serde(default)]
    pub settings: Settings,
    /// Absent for single-state keys.
    #[serde(default)]
    pub state: Option<DisplayState>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppearancePayload {
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendToPluginPayload {
    #[serde(default)]
    pub sdpi_collection: Option<SdpiCollection>,
}

/// One changed property-inspector field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SdpiCollection {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

// ── Plugin → host ─────────────────────────────────────────────────────────────

/// Commands the plugin sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostCommand {
    SetState {
        context: ConsumerId,
        payload: StatePayload,
    },
    ShowAlert {
        context: ConsumerId,
    },
    ShowOk {
        context: ConsumerId,
    },
    LogMessage {
        payload: LogPayload,
    },
    SetSettings {
        context: ConsumerId,
        payload: Settings,
    },
}

impl HostCommand {
    pub fn set_state(context: ConsumerId, state: DisplayState) -> Self {
        Self::SetState {
            context,
            payload: StatePayload { state },
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::LogMessage {
            payload: LogPayload {
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatePayload {
    pub state: DisplayState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPayload {
    pub message: String,
}

/// First frame sent after connecting to the host.
///
/// The event name is supplied on the command line, so this is not a
/// [`HostCommand`] variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub event: String,
    pub uuid: String,
}
