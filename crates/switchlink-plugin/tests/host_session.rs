//! End-to-end test of the host adapter.
//!
//! A local WebSocket listener plays the Stream Deck application and a
//! [`MemoryConnector`] plays the game server, so the whole path from a
//! `willAppear` JSON frame to a `setState` JSON frame runs for real.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use switchlink_core::{AppResponse, EntityId, RequestBody};
use switchlink_plugin::domain::{PluginConfig, SMART_SWITCH_ACTION};
use switchlink_plugin::infrastructure::{run_host, HostConnection, MemoryConnector};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const CONFIG: &str =
    r#"{"ip":"203.0.113.4","port":28082,"entityId":5,"playerId":"76561198000000001","playerToken":-7}"#;

type HostSocket = WebSocketStream<TcpStream>;

async fn next_json(ws: &mut HostSocket) -> Value {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("a frame from the plugin")
            .expect("socket open")
            .expect("valid frame");
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(&text).expect("plugin sends JSON");
        }
    }
}

/// Next frame with the given `event`, skipping log lines and anything else.
async fn next_command(ws: &mut HostSocket, event: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["event"] == event {
            return frame;
        }
    }
}

async fn send_json(ws: &mut HostSocket, value: Value) {
    ws.send(WsMessage::Text(value.to_string()))
        .await
        .expect("send to plugin");
}

#[tokio::test]
async fn test_button_lifecycle_through_the_host_socket() {
    // Arrange – host listener, in-memory game server, plugin task
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (connector, mut peers) = MemoryConnector::new();
    let shutdown = CancellationToken::new();
    let plugin = tokio::spawn(run_host(
        HostConnection {
            port,
            plugin_uuid: "PLUGIN-UUID".into(),
            register_event: "registerPlugin".into(),
        },
        PluginConfig::default(),
        connector.clone(),
        shutdown.clone(),
    ));
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut host = accept_async(tcp).await.unwrap();

    // Registration comes first
    assert_eq!(
        next_json(&mut host).await,
        json!({"event": "registerPlugin", "uuid": "PLUGIN-UUID"})
    );

    // Act – the button appears with a valid config
    send_json(
        &mut host,
        json!({
            "event": "willAppear",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-1",
            "device": "dev",
            "payload": {"settings": {"connection-config": CONFIG}, "coordinates": {"column": 0, "row": 0}}
        }),
    )
    .await;
    let mut server = timeout(WAIT, peers.recv()).await.unwrap().unwrap();
    let query = server.next_request().await.unwrap();
    server
        .respond(AppResponse::entity_info(query.seq, true))
        .await;

    // Assert – powered switch shows state 0
    assert_eq!(query.entity_id, EntityId(5));
    assert_eq!(
        next_command(&mut host, "setState").await,
        json!({"event": "setState", "context": "ctx-1", "payload": {"state": 0}})
    );

    // Act – key pressed while showing state 0 asks to switch off
    send_json(
        &mut host,
        json!({
            "event": "keyUp",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-1",
            "payload": {"settings": {}, "state": 0}
        }),
    )
    .await;
    let toggle = server.next_request().await.unwrap();
    server.respond(AppResponse::success(toggle.seq)).await;
    server.broadcast(EntityId(5), false).await;

    // Assert
    assert_eq!(toggle.body, RequestBody::SetEntityValue { value: false });
    assert_eq!(
        next_command(&mut host, "setState").await,
        json!({"event": "setState", "context": "ctx-1", "payload": {"state": 1}})
    );

    // Act – shut down
    shutdown.cancel();

    // Assert – the plugin exits cleanly and hangs up on the game server
    let result = timeout(WAIT, plugin).await.unwrap().unwrap();
    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(server.next_request().await, None);
}

#[tokio::test]
async fn test_malformed_frames_and_foreign_actions_are_skipped() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (connector, _peers) = MemoryConnector::new();
    let shutdown = CancellationToken::new();
    let plugin = tokio::spawn(run_host(
        HostConnection {
            port,
            plugin_uuid: "PLUGIN-UUID".into(),
            register_event: "registerPlugin".into(),
        },
        PluginConfig::default(),
        connector.clone(),
        shutdown.clone(),
    ));
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut host = accept_async(tcp).await.unwrap();
    next_json(&mut host).await;

    // Act
    host.send(WsMessage::Text("not json".into())).await.unwrap();
    send_json(
        &mut host,
        json!({
            "event": "willAppear",
            "action": "com.example.other",
            "context": "ctx-x",
            "payload": {"settings": {"connection-config": CONFIG}}
        }),
    )
    .await;
    // A keyUp without config makes the plugin answer, which proves the
    // frames before it were consumed without killing the session.
    send_json(
        &mut host,
        json!({
            "event": "willAppear",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-2",
            "payload": {"settings": {}}
        }),
    )
    .await;
    send_json(
        &mut host,
        json!({
            "event": "keyUp",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-2",
            "payload": {"settings": {}, "state": 1}
        }),
    )
    .await;

    // Assert
    assert_eq!(
        next_command(&mut host, "showAlert").await,
        json!({"event": "showAlert", "context": "ctx-2"})
    );
    assert_eq!(connector.attempts(), 0, "foreign action never connected");

    // Host hangs up: the plugin returns on its own
    drop(host);
    let result = timeout(WAIT, plugin).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_setting_change_is_echoed_and_confirmed_with_show_ok() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (connector, mut peers) = MemoryConnector::new();
    let shutdown = CancellationToken::new();
    let plugin = tokio::spawn(run_host(
        HostConnection {
            port,
            plugin_uuid: "PLUGIN-UUID".into(),
            register_event: "registerPlugin".into(),
        },
        PluginConfig::default(),
        connector.clone(),
        shutdown.clone(),
    ));
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut host = accept_async(tcp).await.unwrap();
    next_json(&mut host).await;
    send_json(
        &mut host,
        json!({
            "event": "willAppear",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-3",
            "payload": {"settings": {}}
        }),
    )
    .await;

    // Act – the property inspector supplies a config
    send_json(
        &mut host,
        json!({
            "event": "sendToPlugin",
            "action": SMART_SWITCH_ACTION,
            "context": "ctx-3",
            "payload": {"sdpi_collection": {"key": "connection-config", "value": CONFIG}}
        }),
    )
    .await;
    let mut server = timeout(WAIT, peers.recv()).await.unwrap().unwrap();
    let query = server.next_request().await.unwrap();
    server
        .respond(AppResponse::entity_info(query.seq, false))
        .await;

    // Assert
    assert_eq!(
        next_command(&mut host, "setSettings").await,
        json!({
            "event": "setSettings",
            "context": "ctx-3",
            "payload": {"connection-config": CONFIG}
        })
    );
    assert_eq!(
        next_command(&mut host, "showOk").await,
        json!({"event": "showOk", "context": "ctx-3"})
    );

    shutdown.cancel();
    assert!(timeout(WAIT, plugin).await.unwrap().unwrap().is_ok());
}
