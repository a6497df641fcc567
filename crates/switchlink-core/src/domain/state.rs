//! Mapping between a switch's boolean value and the button's display state.
//!
//! The button is a two-state key. State `0` shows the "on" image and state `1`
//! the "off" image, so a powered switch renders as state `0`. When the user
//! presses the key, the host reports the state the key was in *before* the
//! press; pressing a key in state `1` (off) asks for the switch to turn on.

use serde::{Deserialize, Serialize};

/// Display state of a two-state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DisplayState {
    /// State 0: the switch is powered.
    On,
    /// State 1: the switch is unpowered.
    Off,
}

impl DisplayState {
    /// Display state for a switch value reported by the server.
    pub fn from_value(value: bool) -> Self {
        if value {
            Self::On
        } else {
            Self::Off
        }
    }

    /// The switch value this display state represents.
    pub fn value(self) -> bool {
        matches!(self, Self::On)
    }

    /// The value a key press should request when the key currently shows `self`.
    pub fn toggled_value(self) -> bool {
        !self.value()
    }

    /// Host-facing state index.
    pub fn index(self) -> u8 {
        match self {
            Self::On => 0,
            Self::Off => 1,
        }
    }
}

impl From<DisplayState> for u8 {
    fn from(state: DisplayState) -> Self {
        state.index()
    }
}

impl TryFrom<u8> for DisplayState {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(Self::On),
            1 => Ok(Self::Off),
            other => Err(format!("display state {other} is not 0 or 1")),
        }
    }
}
