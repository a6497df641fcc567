//! The Stream Deck host connection.
//!
//! The host launches the plugin with a local WebSocket port and a
//! registration token. [`run_host`] connects back, registers, and then runs
//! three concurrent pieces until the host goes away or shutdown is requested:
//!
//! ```text
//!  host ws ──Text──► read loop ──HostEvent──► SessionManager ──► registry
//!                                                                   │
//!  host ws ◄─Text── writer task ◄─HostCommand── event task ◄─MuxEvent┘
//! ```
//!
//! The read loop owns the [`SessionManager`], so session state needs no lock.
//! Commands from the session (`setSettings`) and from the event task share
//! one channel into the writer, which keeps the socket single-writer.

use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::{host_commands_for, ConnectionRegistry, Connector, SessionManager};
use crate::domain::{HostCommand, HostEvent, PluginConfig, Registration};

/// How to reach and register with the host, as passed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConnection {
    pub port: u16,
    pub plugin_uuid: String,
    pub register_event: String,
}

impl HostConnection {
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}

/// Runs the plugin against the host until the host disconnects or
/// `shutdown` fires. On the way out every button is detached and every game
/// server connection is closed.
///
/// # Errors
///
/// Returns an error if the host socket cannot be opened or the registration
/// message cannot be sent. Errors after registration are logged, not returned.
pub async fn run_host(
    host: HostConnection,
    config: PluginConfig,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let url = host.url();
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to Stream Deck host at {url}"))?;
    info!("connected to Stream Deck host at {url}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let registration = Registration {
        event: host.register_event.clone(),
        uuid: host.plugin_uuid.clone(),
    };
    let registration = serde_json::to_string(&registration).context("encoding registration")?;
    ws_tx
        .send(WsMessage::Text(registration))
        .await
        .context("sending registration to host")?;
    debug!("registered plugin {}", host.plugin_uuid);

    let (registry, mut events) = ConnectionRegistry::new(connector, config.multiplexer);
    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<HostCommand>();
    let mut session = SessionManager::new(
        registry.clone(),
        commands_tx.clone(),
        config.plugin.action_uuid.clone(),
    );

    // ── Writer: HostCommand → Text frames ─────────────────────────────────────
    let writer_task = tokio::spawn(async move {
        while let Some(command) = commands_rx.recv().await {
            let text = match serde_json::to_string(&command) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to encode host command: {e}");
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                debug!("host socket write failed: {e}");
                return;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Events: MuxEvent → HostCommand ────────────────────────────────────────
    let event_commands = commands_tx.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            for command in host_commands_for(event) {
                if event_commands.send(command).is_err() {
                    return;
                }
            }
        }
    });

    // ── Read loop: Text frames → SessionManager ───────────────────────────────
    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested, leaving host session");
                break;
            }
            message = ws_rx.next() => message,
        };
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                info!("Stream Deck host closed the connection");
                break;
            }
            Some(Err(e)) => {
                warn!("host socket error: {e}");
                break;
            }
        };
        match message {
            WsMessage::Text(text) => match serde_json::from_str::<HostEvent>(&text) {
                Ok(event) => session.handle_event(event),
                Err(e) => warn!("ignoring malformed host message: {e}"),
            },
            WsMessage::Close(_) => {
                info!("Stream Deck host sent Close");
                break;
            }
            WsMessage::Binary(data) => {
                debug!("ignoring {}-byte binary frame from host", data.len());
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    session.detach_all();
    registry.close_all();
    event_task.abort();
    drop(session);
    drop(commands_tx);
    // Flushes anything already queued, then closes the socket.
    let _ = writer_task.await;
    info!("host session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_url_is_loopback() {
        let host = HostConnection {
            port: 28196,
            plugin_uuid: "abc".into(),
            register_event: "registerPlugin".into(),
        };
        assert_eq!(host.url(), "ws://127.0.0.1:28196");
    }
}
