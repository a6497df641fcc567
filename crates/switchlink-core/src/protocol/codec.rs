//! Codec for the companion-app protocol.
//!
//! Every WebSocket binary frame carries exactly one protobuf message: an
//! `AppRequest` from client to server, or an `AppMessage` from server to
//! client. Field numbers used here:
//!
//! ```text
//! AppRequest        seq=1 playerId=2 playerToken=3 entityId=4
//!                   getEntityInfo=14 {} setEntityValue=15 {value=1}
//! AppMessage        response=1 broadcast=2
//! AppResponse       seq=1 success=4 {} error=5 {error=1} entityInfo=11
//! AppEntityInfo     type=1 payload=3
//! AppEntityPayload  value=1
//! AppBroadcast      entityChanged=6
//! AppEntityChanged  entityId=1 payload=2
//! ```
//!
//! Fields not listed are skipped on decode, so newer servers that add fields
//! remain compatible.

use thiserror::Error;

use crate::domain::settings::{EntityId, PlayerId, PlayerToken};
use crate::protocol::messages::{
    AppBroadcast, AppMessage, AppRequest, AppResponse, EntityChanged, EntityInfo, EntityPayload,
    RequestBody,
};
use crate::protocol::wire::{
    write_bool_field, write_bytes_field, write_int32_field, write_varint_field, FieldReader,
    WireType,
};

/// `AppEntityType.Switch`; written into `AppEntityInfo.type` when encoding.
const ENTITY_TYPE_SWITCH: u64 = 1;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice ended in the middle of a value.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A field key used a wire type this codec does not implement.
    #[error("unsupported wire type: {0}")]
    UnsupportedWireType(u8),

    /// The payload could not be parsed (bad field, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A length prefix points past the end of the buffer.
    #[error("payload length mismatch: prefix says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A field the schema requires was absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`AppRequest`] into a single frame.
///
/// # Examples
///
/// ```rust
/// use switchlink_core::protocol::{decode_request, encode_request, AppRequest, RequestBody};
/// use switchlink_core::{EntityId, PlayerId, PlayerToken};
///
/// let request = AppRequest {
///     seq: 1,
///     player_id: PlayerId(76561198000000001),
///     player_token: PlayerToken(-42),
///     entity_id: EntityId(1234),
///     body: RequestBody::GetEntityInfo,
/// };
/// let bytes = encode_request(&request);
/// assert_eq!(decode_request(&bytes).unwrap(), request);
/// ```
pub fn encode_request(request: &AppRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    write_varint_field(&mut buf, 1, u64::from(request.seq));
    write_varint_field(&mut buf, 2, request.player_id.0);
    write_int32_field(&mut buf, 3, request.player_token.0);
    write_varint_field(&mut buf, 4, u64::from(request.entity_id.0));
    match request.body {
        RequestBody::GetEntityInfo => write_bytes_field(&mut buf, 14, &[]),
        RequestBody::SetEntityValue { value } => {
            let mut inner = Vec::with_capacity(2);
            write_bool_field(&mut inner, 1, value);
            write_bytes_field(&mut buf, 15, &inner);
        }
    }
    buf
}

/// Decodes a server frame into an [`AppMessage`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is truncated, malformed, or carries
/// neither a response nor a broadcast.
pub fn decode_message(bytes: &[u8]) -> Result<AppMessage, ProtocolError> {
    let mut response = None;
    let mut broadcast = None;

    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        match field {
            1 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppMessage.response")?;
                response = Some(decode_response(reader.read_bytes()?)?);
            }
            2 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppMessage.broadcast")?;
                broadcast = Some(decode_broadcast(reader.read_bytes()?)?);
            }
            _ => skip_unknown(&mut reader, field, wire_type)?,
        }
    }

    match (response, broadcast) {
        (Some(response), _) => Ok(AppMessage::Response(response)),
        (None, Some(broadcast)) => Ok(AppMessage::Broadcast(broadcast)),
        (None, None) => Err(ProtocolError::MissingField("AppMessage.response|broadcast")),
    }
}

/// Encodes an [`AppMessage`] as a server would send it.
pub fn encode_message(message: &AppMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    match message {
        AppMessage::Response(response) => {
            write_bytes_field(&mut buf, 1, &encode_response(response));
        }
        AppMessage::Broadcast(broadcast) => {
            write_bytes_field(&mut buf, 2, &encode_broadcast(broadcast));
        }
    }
    buf
}

/// Decodes a client frame into an [`AppRequest`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if a required field is missing or the frame is
/// malformed.
pub fn decode_request(bytes: &[u8]) -> Result<AppRequest, ProtocolError> {
    let mut seq = None;
    let mut player_id = None;
    let mut player_token = None;
    let mut entity_id = None;
    let mut body = None;

    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        match field {
            1 => {
                expect_wire(wire_type, WireType::Varint, "AppRequest.seq")?;
                seq = Some(reader.read_u32()?);
            }
            2 => {
                expect_wire(wire_type, WireType::Varint, "AppRequest.playerId")?;
                player_id = Some(PlayerId(reader.read_varint()?));
            }
            3 => {
                expect_wire(wire_type, WireType::Varint, "AppRequest.playerToken")?;
                player_token = Some(PlayerToken(reader.read_i32()?));
            }
            4 => {
                expect_wire(wire_type, WireType::Varint, "AppRequest.entityId")?;
                entity_id = Some(EntityId(reader.read_u32()?));
            }
            14 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppRequest.getEntityInfo")?;
                reader.read_bytes()?;
                body = Some(RequestBody::GetEntityInfo);
            }
            15 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppRequest.setEntityValue")?;
                let value = decode_bool_wrapper(reader.read_bytes()?, "AppSetEntityValue")?;
                body = Some(RequestBody::SetEntityValue { value });
            }
            _ => skip_unknown(&mut reader, field, wire_type)?,
        }
    }

    Ok(AppRequest {
        seq: seq.ok_or(ProtocolError::MissingField("AppRequest.seq"))?,
        player_id: player_id.ok_or(ProtocolError::MissingField("AppRequest.playerId"))?,
        player_token: player_token.ok_or(ProtocolError::MissingField("AppRequest.playerToken"))?,
        entity_id: entity_id.ok_or(ProtocolError::MissingField("AppRequest.entityId"))?,
        body: body.ok_or(ProtocolError::MissingField("AppRequest body"))?,
    })
}

// ── Response / broadcast decoding ─────────────────────────────────────────────

fn decode_response(bytes: &[u8]) -> Result<AppResponse, ProtocolError> {
    let mut seq = None;
    let mut response = AppResponse::default();

    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        match field {
            1 => {
                expect_wire(wire_type, WireType::Varint, "AppResponse.seq")?;
                seq = Some(reader.read_u32()?);
            }
            4 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppResponse.success")?;
                reader.read_bytes()?;
                response.success = true;
            }
            5 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppResponse.error")?;
                response.error = Some(decode_error(reader.read_bytes()?)?);
            }
            11 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppResponse.entityInfo")?;
                response.entity_info = Some(decode_entity_info(reader.read_bytes()?)?);
            }
            _ => skip_unknown(&mut reader, field, wire_type)?,
        }
    }

    response.seq = seq.ok_or(ProtocolError::MissingField("AppResponse.seq"))?;
    Ok(response)
}

fn decode_error(bytes: &[u8]) -> Result<String, ProtocolError> {
    let mut message = None;
    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        if field == 1 {
            expect_wire(wire_type, WireType::LengthDelimited, "AppError.error")?;
            message = Some(reader.read_string()?);
        } else {
            skip_unknown(&mut reader, field, wire_type)?;
        }
    }
    message.ok_or(ProtocolError::MissingField("AppError.error"))
}

fn decode_entity_info(bytes: &[u8]) -> Result<EntityInfo, ProtocolError> {
    let mut payload = None;
    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        if field == 3 {
            expect_wire(wire_type, WireType::LengthDelimited, "AppEntityInfo.payload")?;
            payload = Some(decode_payload(reader.read_bytes()?)?);
        } else {
            // `type` and anything newer are not needed to drive a switch.
            skip_unknown(&mut reader, field, wire_type)?;
        }
    }
    Ok(EntityInfo {
        payload: payload.ok_or(ProtocolError::MissingField("AppEntityInfo.payload"))?,
    })
}

fn decode_payload(bytes: &[u8]) -> Result<EntityPayload, ProtocolError> {
    Ok(EntityPayload {
        value: decode_bool_wrapper(bytes, "AppEntityPayload")?,
    })
}

fn decode_broadcast(bytes: &[u8]) -> Result<AppBroadcast, ProtocolError> {
    let mut broadcast = AppBroadcast::default();
    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        if field == 6 {
            expect_wire(wire_type, WireType::LengthDelimited, "AppBroadcast.entityChanged")?;
            broadcast.entity_changed = Some(decode_entity_changed(reader.read_bytes()?)?);
        } else {
            skip_unknown(&mut reader, field, wire_type)?;
        }
    }
    Ok(broadcast)
}

fn decode_entity_changed(bytes: &[u8]) -> Result<EntityChanged, ProtocolError> {
    let mut entity_id = None;
    let mut payload = None;
    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        match field {
            1 => {
                expect_wire(wire_type, WireType::Varint, "AppEntityChanged.entityId")?;
                entity_id = Some(EntityId(reader.read_u32()?));
            }
            2 => {
                expect_wire(wire_type, WireType::LengthDelimited, "AppEntityChanged.payload")?;
                payload = Some(decode_payload(reader.read_bytes()?)?);
            }
            _ => skip_unknown(&mut reader, field, wire_type)?,
        }
    }
    Ok(EntityChanged {
        entity_id: entity_id.ok_or(ProtocolError::MissingField("AppEntityChanged.entityId"))?,
        payload: payload.ok_or(ProtocolError::MissingField("AppEntityChanged.payload"))?,
    })
}

// ── Response / broadcast encoding ─────────────────────────────────────────────

fn encode_response(response: &AppResponse) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint_field(&mut buf, 1, u64::from(response.seq));
    if response.success {
        write_bytes_field(&mut buf, 4, &[]);
    }
    if let Some(error) = &response.error {
        let mut inner = Vec::with_capacity(error.len() + 2);
        write_bytes_field(&mut inner, 1, error.as_bytes());
        write_bytes_field(&mut buf, 5, &inner);
    }
    if let Some(info) = &response.entity_info {
        let mut inner = Vec::new();
        write_varint_field(&mut inner, 1, ENTITY_TYPE_SWITCH);
        write_bytes_field(&mut inner, 3, &encode_payload(&info.payload));
        write_bytes_field(&mut buf, 11, &inner);
    }
    buf
}

fn encode_broadcast(broadcast: &AppBroadcast) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(changed) = &broadcast.entity_changed {
        let mut inner = Vec::new();
        write_varint_field(&mut inner, 1, u64::from(changed.entity_id.0));
        write_bytes_field(&mut inner, 2, &encode_payload(&changed.payload));
        write_bytes_field(&mut buf, 6, &inner);
    }
    buf
}

fn encode_payload(payload: &EntityPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2);
    write_bool_field(&mut buf, 1, payload.value);
    buf
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Decodes a message whose only interesting field is `bool value = 1`.
/// An absent value decodes as `false`, the protobuf default.
fn decode_bool_wrapper(bytes: &[u8], context: &'static str) -> Result<bool, ProtocolError> {
    let mut value = false;
    let mut reader = FieldReader::new(bytes);
    while let Some((field, wire_type)) = reader.next_key()? {
        if field == 1 {
            expect_wire(wire_type, WireType::Varint, context)?;
            value = reader.read_bool()?;
        } else {
            skip_unknown(&mut reader, field, wire_type)?;
        }
    }
    Ok(value)
}

fn expect_wire(
    actual: WireType,
    expected: WireType,
    context: &'static str,
) -> Result<(), ProtocolError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: expected {expected:?} wire type, got {actual:?}"
        )))
    }
}

fn skip_unknown(
    reader: &mut FieldReader<'_>,
    field: u32,
    wire_type: WireType,
) -> Result<(), ProtocolError> {
    tracing::trace!("skipping unknown field {field} ({wire_type:?})");
    reader.skip(wire_type)
}
