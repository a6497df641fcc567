//! Integration tests for the switchlink-core protocol codec.
//!
//! These tests drive a request/response exchange through the public API the
//! way a client and a server would: settings are parsed into credentials, the
//! sequence counter numbers requests, and the server echoes the number back.

use switchlink_core::protocol::messages::{AppBroadcast, EntityChanged, EntityPayload};
use switchlink_core::protocol::SequenceCounter;
use switchlink_core::{
    decode_message, decode_request, encode_message, encode_request, AppMessage, AppRequest,
    AppResponse, ConnectionConfig, DisplayState, EntityId, RequestBody,
};

const SETTINGS: &str = r#"{"ip":"198.51.100.20","port":"28082","entityId":4242,
    "playerId":"76561198000000001","playerToken":-99}"#;

/// Builds the frame a client would send for `body` using parsed settings.
fn client_frame(counter: &mut SequenceCounter, body: RequestBody) -> (u32, Vec<u8>) {
    let config = ConnectionConfig::parse(SETTINGS).expect("settings must parse");
    let credentials = config.credentials();
    let seq = counter.allocate(|_| false);
    let request = AppRequest {
        seq,
        player_id: credentials.player_id,
        player_token: credentials.player_token,
        entity_id: config.entity_id,
        body,
    };
    (seq, encode_request(&request))
}

#[test]
fn test_server_sees_credentials_and_entity_from_settings() {
    // Arrange
    let mut counter = SequenceCounter::new();

    // Act
    let (seq, frame) = client_frame(&mut counter, RequestBody::GetEntityInfo);
    let seen = decode_request(&frame).expect("server must decode the request");

    // Assert
    assert_eq!(seq, 1);
    assert_eq!(seen.seq, 1);
    assert_eq!(seen.entity_id, EntityId(4242));
    assert_eq!(seen.player_id.0, 76561198000000001);
    assert_eq!(seen.player_token.0, -99);
    assert_eq!(seen.body, RequestBody::GetEntityInfo);
}

#[test]
fn test_response_echoes_request_seq_and_maps_to_display_state() {
    // Arrange – the client sends a query, the server replies "powered"
    let mut counter = SequenceCounter::new();
    let (seq, frame) = client_frame(&mut counter, RequestBody::GetEntityInfo);
    let seen = decode_request(&frame).unwrap();
    let reply = encode_message(&AppMessage::Response(AppResponse::entity_info(
        seen.seq, true,
    )));

    // Act
    let decoded = decode_message(&reply).expect("client must decode the reply");

    // Assert
    let AppMessage::Response(response) = decoded else {
        panic!("expected a response");
    };
    assert_eq!(response.seq, seq);
    let value = response.entity_info.expect("entity info").payload.value;
    assert_eq!(DisplayState::from_value(value).index(), 0);
}

#[test]
fn test_toggle_from_off_key_requests_power_on() {
    // Arrange – key currently shows state 1 (off)
    let mut counter = SequenceCounter::new();
    let desired = DisplayState::Off.toggled_value();

    // Act
    let (_, frame) = client_frame(&mut counter, RequestBody::SetEntityValue { value: desired });

    // Assert
    assert_eq!(
        decode_request(&frame).unwrap().body,
        RequestBody::SetEntityValue { value: true }
    );
}

#[test]
fn test_broadcast_for_other_entity_is_distinguishable() {
    let frame = encode_message(&AppMessage::Broadcast(AppBroadcast {
        entity_changed: Some(EntityChanged {
            entity_id: EntityId(7),
            payload: EntityPayload { value: true },
        }),
    }));

    match decode_message(&frame).unwrap() {
        AppMessage::Broadcast(b) => {
            let changed = b.entity_changed.expect("entityChanged");
            assert_ne!(changed.entity_id, EntityId(4242));
            assert!(changed.payload.value);
        }
        other => panic!("expected Broadcast, got {:?}", other),
    }
}

#[test]
fn test_numbers_after_reconnect_restart_at_zero() {
    let mut counter = SequenceCounter::new();
    client_frame(&mut counter, RequestBody::GetEntityInfo);
    client_frame(&mut counter, RequestBody::GetEntityInfo);

    counter.reset();
    let (seq, frame) = client_frame(&mut counter, RequestBody::GetEntityInfo);

    assert_eq!(seq, 0);
    assert_eq!(decode_request(&frame).unwrap().seq, 0);
}
