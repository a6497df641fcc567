//! Companion-app message types.
//!
//! These mirror the subset of the game server's `AppRequest` / `AppMessage`
//! schema that the multiplexer needs: entity-info queries, switch toggles and
//! the `entityChanged` broadcast. Everything else on the wire is skipped by the
//! decoder.

use crate::domain::settings::{EntityId, PlayerId, PlayerToken};

/// Sequence number tagging a request and its response.
pub type Seq = u32;

// ── Requests ──────────────────────────────────────────────────────────────────

/// The operation carried by an [`AppRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody {
    /// Ask for the entity's current payload.
    GetEntityInfo,
    /// Drive a switch entity on or off.
    SetEntityValue { value: bool },
}

impl RequestBody {
    /// Short name used in log lines and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetEntityInfo => "getEntityInfo",
            Self::SetEntityValue { .. } => "setEntityValue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRequest {
    pub seq: Seq,
    pub player_id: PlayerId,
    pub player_token: PlayerToken,
    pub entity_id: EntityId,
    pub body: RequestBody,
}

// ── Responses and broadcasts ──────────────────────────────────────────────────

/// Entity state payload. Only the boolean switch value is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityPayload {
    pub value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityInfo {
    pub payload: EntityPayload,
}

/// A reply correlated with an earlier request by `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppResponse {
    pub seq: Seq,
    /// Set when the server sent the empty `success` marker.
    pub success: bool,
    /// Server-side error text, e.g. `"not_found"`.
    pub error: Option<String>,
    pub entity_info: Option<EntityInfo>,
}

impl AppResponse {
    pub fn success(seq: Seq) -> Self {
        Self {
            seq,
            success: true,
            ..Self::default()
        }
    }

    pub fn entity_info(seq: Seq, value: bool) -> Self {
        Self {
            seq,
            entity_info: Some(EntityInfo {
                payload: EntityPayload { value },
            }),
            ..Self::default()
        }
    }

    pub fn error(seq: Seq, message: impl Into<String>) -> Self {
        Self {
            seq,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityChanged {
    pub entity_id: EntityId,
    pub payload: EntityPayload,
}

/// An unsolicited server push.
///
/// `entity_changed` is `None` for broadcast kinds the multiplexer does not
/// model (team chat, map markers and so on); those are decoded and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppBroadcast {
    pub entity_changed: Option<EntityChanged>,
}

/// Top-level inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMessage {
    Response(AppResponse),
    Broadcast(AppBroadcast),
}

impl AppMessage {
    /// Convenience constructor for an `entityChanged` broadcast.
    pub fn entity_changed(entity_id: EntityId, value: bool) -> Self {
        Self::Broadcast(AppBroadcast {
            entity_changed: Some(EntityChanged {
                entity_id,
                payload: EntityPayload { value },
            }),
        })
    }
}
