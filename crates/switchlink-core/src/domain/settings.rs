//! Connection settings attached to a smart-switch button.
//!
//! A button's `connection-config` setting is a JSON object:
//!
//! ```json
//! { "ip": "203.0.113.7", "port": 28082, "entityId": 1234567,
//!   "playerId": "76561198000000000", "playerToken": -1284311 }
//! ```
//!
//! Parsing is strict: unknown keys, missing keys and values that do not fit
//! their wire types are all rejected. `port` and `playerId` may be given either
//! as JSON numbers or as decimal strings, because pairing tools commonly emit
//! 64-bit ids as strings.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a `connection-config` value.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("connection config is empty")]
    Empty,

    #[error("connection config is not valid: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("connection config has an empty ip")]
    EmptyHost,

    #[error("connection config port must be between 1 and 65535")]
    InvalidPort,
}

/// Identifier of a server-side entity (a smart switch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Steam id of the paired player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

/// Opaque pairing token. Passed through to the server unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerToken(pub i32);

/// Credentials sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub player_id: PlayerId,
    pub player_token: PlayerToken,
}

/// Identity of a shared connection: one live connection exists per key.
///
/// Two buttons pointing at the same server share a connection even when
/// their entity ids or credentials differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    host: String,
    port: u16,
}

impl ConnectionKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// WebSocket URL of the server's companion endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A fully parsed `connection-config` setting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionConfig {
    pub ip: String,
    #[serde(deserialize_with = "number_or_string")]
    pub port: u16,
    pub entity_id: EntityId,
    #[serde(deserialize_with = "player_id")]
    pub player_id: PlayerId,
    pub player_token: PlayerToken,
}

impl ConnectionConfig {
    /// Parses a raw `connection-config` string.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the string is blank, is not a JSON object
    /// of exactly the expected shape, or names an empty host or port 0.
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SettingsError::Empty);
        }
        let config: Self = serde_json::from_str(trimmed)?;
        if config.ip.trim().is_empty() {
            return Err(SettingsError::EmptyHost);
        }
        if config.port == 0 {
            return Err(SettingsError::InvalidPort);
        }
        Ok(config)
    }

    /// Parses an optional setting, treating absence or any parse failure as
    /// "no connection".
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        match Self::parse(raw?) {
            Ok(config) => Some(config),
            Err(SettingsError::Empty) => None,
            Err(e) => {
                tracing::debug!("ignoring connection config: {e}");
                None
            }
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.ip.trim(), self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            player_id: self.player_id,
            player_token: self.player_token,
        }
    }
}

// ── Lenient numeric fields ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn parse_numeric<T, E>(value: NumberOrString) -> Result<T, E>
where
    T: TryFrom<u64> + FromStr,
    E: de::Error,
{
    match value {
        NumberOrString::Number(n) => {
            T::try_from(n).map_err(|_| E::custom(format!("{n} is out of range")))
        }
        NumberOrString::String(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| E::custom(format!("{s:?} is not a valid number"))),
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    parse_numeric(NumberOrString::deserialize(deserializer)?)
}

fn player_id<'de, D>(deserializer: D) -> Result<PlayerId, D::Error>
where
    D: Deserializer<'de>,
{
    parse_numeric::<u64, _>(NumberOrString::deserialize(deserializer)?).map(PlayerId)
}
