//! Plugin configuration types.
//!
//! [`PluginConfig`] is the single source of truth for the multiplexer's
//! timings and the action the plugin answers to. It can be built from
//! defaults (what the Stream Deck launches with) or from an optional TOML file
//! passed with `--config`:
//!
//! ```toml
//! [multiplexer]
//! grace_period_secs = 30
//! reconnect_delay_secs = 30
//! request_timeout_secs = 10
//!
//! [plugin]
//! action_uuid = "tech.macil.rustplus.smartswitch"
//! ```
//!
//! Every field has a serde default, so a partial file (or an empty one) is
//! valid.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// The only action this plugin registers in its manifest.
pub const SMART_SWITCH_ACTION: &str = "tech.macil.rustplus.smartswitch";

/// All runtime configuration for the plugin.
///
/// # Example
///
/// ```rust
/// use switchlink_plugin::domain::PluginConfig;
///
/// let cfg = PluginConfig::default();
/// assert_eq!(cfg.multiplexer.grace_period().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub multiplexer: MultiplexerConfig,
    #[serde(default)]
    pub plugin: ActionConfig,
}

impl PluginConfig {
    /// Parses a TOML document. Missing sections and fields fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the document is not valid TOML, a field has
    /// the wrong type, or the reconnect delay or request timeout is zero.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Connection-lifecycle timings.
///
/// | Field                 | Default    |
/// |-----------------------|------------|
/// | grace_period_secs     | 30 seconds |
/// | reconnect_delay_secs  | 30 seconds |
/// | request_timeout_secs  | 10 seconds |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    /// How long a connection with no subscribers lingers before teardown.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Fixed delay between an unexpected close (or failed connect) and the
    /// next connection attempt. Must be at least one second.
    #[serde(
        default = "default_reconnect_delay_secs",
        deserialize_with = "positive_secs"
    )]
    pub reconnect_delay_secs: u64,

    /// Overall bound on a button press: waiting for the connection plus the
    /// request/response exchange. Must be at least one second.
    #[serde(
        default = "default_request_timeout_secs",
        deserialize_with = "positive_secs"
    )]
    pub request_timeout_secs: u64,
}

impl MultiplexerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Host events for any other action are ignored.
    #[serde(default = "default_action_uuid")]
    pub action_uuid: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            action_uuid: default_action_uuid(),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_grace_period_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_action_uuid() -> String {
    SMART_SWITCH_ACTION.to_string()
}

fn positive_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    if secs == 0 {
        return Err(serde::de::Error::custom("must be at least 1 second"));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let cfg = MultiplexerConfig::default();
        assert_eq!(cfg.grace_period(), Duration::from_secs(30));
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(30));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg = PluginConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PluginConfig::default());
        assert_eq!(cfg.plugin.action_uuid, SMART_SWITCH_ACTION);
    }

    #[test]
    fn test_partial_toml_overrides_only_given_fields() {
        // Arrange
        let raw = "[multiplexer]\nreconnect_delay_secs = 5\n";

        // Act
        let cfg = PluginConfig::from_toml_str(raw).unwrap();

        // Assert
        assert_eq!(cfg.multiplexer.reconnect_delay_secs, 5);
        assert_eq!(cfg.multiplexer.grace_period_secs, 30);
        assert_eq!(cfg.multiplexer.request_timeout_secs, 10);
    }

    #[test]
    fn test_action_uuid_override() {
        let raw = "[plugin]\naction_uuid = \"com.example.other\"\n";
        let cfg = PluginConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.plugin.action_uuid, "com.example.other");
    }

    #[test]
    fn test_zero_reconnect_delay_or_timeout_is_rejected() {
        for raw in [
            "[multiplexer]\nreconnect_delay_secs = 0\n",
            "[multiplexer]\nrequest_timeout_secs = 0\n",
        ] {
            let err = PluginConfig::from_toml_str(raw).unwrap_err();
            assert!(err.to_string().contains("at least 1 second"), "{err}");
        }
    }

    #[test]
    fn test_zero_grace_period_is_allowed() {
        let cfg = PluginConfig::from_toml_str("[multiplexer]\ngrace_period_secs = 0\n").unwrap();
        assert_eq!(cfg.multiplexer.grace_period(), Duration::ZERO);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let raw = "[multiplexer]\ngrace_period_secs = \"soon\"\n";
        assert!(PluginConfig::from_toml_str(raw).is_err());
    }
}
