//! Consumer sessions: the per-button lifecycle that drives the registry.
//!
//! The host reports four things about a button, and each maps onto the
//! multiplexer:
//!
//! | host event                    | session operation     | multiplexer effect          |
//! |-------------------------------|-----------------------|-----------------------------|
//! | `willAppear`                  | [`attach`]            | `registry.attach`           |
//! | `willDisappear`               | [`detach`]            | `registry.detach`           |
//! | `sendToPlugin` (setting)      | [`settings_changed`]  | detach + attach, `showOk`   |
//! | `keyUp`                       | [`user_toggled`]      | `setEntityValue` request    |
//!
//! Buttons without a valid `connection-config` are tracked (their settings are
//! still persisted) but never attached.
//!
//! [`attach`]: SessionManager::attach
//! [`detach`]: SessionManager::detach
//! [`settings_changed`]: SessionManager::settings_changed
//! [`user_toggled`]: SessionManager::user_toggled

use std::collections::HashMap;

use serde_json::Value;
use switchlink_core::ConnectionConfig;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::gateway::RequestGateway;
use crate::application::ready::wait_ready;
use crate::application::registry::ConnectionRegistry;
use crate::domain::host_messages::{connection_config_from, CONNECTION_CONFIG_KEY};
use crate::domain::{ConsumerId, HostCommand, HostEvent, MuxEvent, Settings};

const NO_CONFIG_MESSAGE: &str = "No valid connection config for button";

#[derive(Debug, Default)]
struct Session {
    settings: Settings,
    config: Option<ConnectionConfig>,
}

/// Owns every button's session and turns host events into multiplexer calls.
///
/// Methods take `&mut self` and never suspend: the host adapter calls them
/// from its single read loop. Anything that has to wait (a toggle request,
/// waiting for a reconfigured connection) runs on a spawned task that reports
/// through the registry's event channel.
pub struct SessionManager {
    registry: ConnectionRegistry,
    gateway: RequestGateway,
    events: mpsc::UnboundedSender<MuxEvent>,
    commands: mpsc::UnboundedSender<HostCommand>,
    action_uuid: String,
    sessions: HashMap<ConsumerId, Session>,
}

impl SessionManager {
    pub fn new(
        registry: ConnectionRegistry,
        commands: mpsc::UnboundedSender<HostCommand>,
        action_uuid: impl Into<String>,
    ) -> Self {
        Self {
            gateway: RequestGateway::new(registry.clone()),
            events: registry.events(),
            registry,
            commands,
            action_uuid: action_uuid.into(),
            sessions: HashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Parsed connection config of a tracked button.
    pub fn config_of(&self, consumer: &ConsumerId) -> Option<&ConnectionConfig> {
        self.sessions.get(consumer)?.config.as_ref()
    }

    /// Dispatches one host event. Events for other actions are ignored.
    pub fn handle_event(&mut self, event: HostEvent) {
        if event.action().is_some_and(|a| a != self.action_uuid) {
            debug!("ignoring event for action {:?}", event.action());
            return;
        }
        match event {
            HostEvent::WillAppear {
                context, payload, ..
            } => self.attach(context, payload.settings),
            HostEvent::WillDisappear { context, .. } => self.detach(&context),
            HostEvent::SendToPlugin {
                context, payload, ..
            } => match payload.sdpi_collection {
                Some(item) => self.settings_changed(&context, item.key, item.value),
                None => debug!("sendToPlugin for {context} without sdpi_collection"),
            },
            HostEvent::KeyUp {
                context, payload, ..
            } => match payload.state {
                Some(state) => self.user_toggled(&context, state.toggled_value()),
                None => warn!("keyUp for {context} without a key state"),
            },
            HostEvent::Other => {}
        }
    }

    /// A button appeared with its saved settings.
    pub fn attach(&mut self, consumer: ConsumerId, settings: Settings) {
        if self.sessions.contains_key(&consumer) {
            // Appearing twice without disappearing; start over.
            self.detach(&consumer);
        }
        let config = connection_config_from(&settings);
        if let Some(config) = &config {
            self.registry.attach(
                &config.key(),
                config.entity_id,
                &consumer,
                config.credentials(),
            );
        } else {
            debug!("button {consumer} has no valid connection config");
        }
        self.sessions.insert(consumer, Session { settings, config });
    }

    /// A button disappeared.
    pub fn detach(&mut self, consumer: &ConsumerId) {
        let Some(session) = self.sessions.remove(consumer) else {
            return;
        };
        if let Some(config) = session.config {
            self.registry
                .detach(&config.key(), config.entity_id, consumer);
        }
    }

    /// The property inspector changed one setting.
    ///
    /// The setting is persisted back to the host. A `connection-config`
    /// change re-attaches the button, and once the new connection is ready
    /// the button flashes OK.
    pub fn settings_changed(&mut self, consumer: &ConsumerId, key: String, value: Value) {
        let Some(session) = self.sessions.get_mut(consumer) else {
            warn!("settings change for unknown button {consumer}");
            return;
        };
        let reconfigure = key == CONNECTION_CONFIG_KEY;
        session.settings.insert(key, value);

        if reconfigure {
            if let Some(old) = session.config.take() {
                self.registry.detach(&old.key(), old.entity_id, consumer);
            }
            session.config = connection_config_from(&session.settings);
            if let Some(config) = &session.config {
                let conn = self.registry.attach(
                    &config.key(),
                    config.entity_id,
                    consumer,
                    config.credentials(),
                );
                // Subscribe now so a connect failure before the task first
                // runs still settles this gate.
                let ready = conn.ready();
                let events = self.events.clone();
                let consumer = consumer.clone();
                tokio::spawn(async move {
                    let event = match wait_ready(ready).await {
                        Ok(()) => MuxEvent::Ready { consumer },
                        Err(e) => MuxEvent::error(vec![consumer], e.to_string()),
                    };
                    let _ = events.send(event);
                });
            }
        }

        let _ = self.commands.send(HostCommand::SetSettings {
            context: consumer.clone(),
            payload: session.settings.clone(),
        });
    }

    /// The user pressed the button, asking for the switch to become `desired`.
    pub fn user_toggled(&mut self, consumer: &ConsumerId, desired: bool) {
        let Some(config) = self.config_of(consumer).cloned() else {
            let _ = self
                .events
                .send(MuxEvent::error(vec![consumer.clone()], NO_CONFIG_MESSAGE));
            return;
        };
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            let result = gateway
                .set_entity_value(
                    &config.key(),
                    config.entity_id,
                    config.credentials(),
                    desired,
                    None,
                )
                .await;
            if let Err(e) = result {
                let _ = events.send(MuxEvent::error(vec![consumer], e.to_string()));
            }
        });
    }

    /// Detaches every button. Used at shutdown.
    pub fn detach_all(&mut self) {
        let consumers: Vec<_> = self.sessions.keys().cloned().collect();
        for consumer in consumers {
            self.detach(&consumer);
        }
    }
}

/// Translates a multiplexer event into the host commands that surface it.
///
/// Errors become one log line naming the affected buttons plus an alert on
/// each of them.
pub fn host_commands_for(event: MuxEvent) -> Vec<HostCommand> {
    match event {
        MuxEvent::StateChanged { consumer, state } => {
            vec![HostCommand::set_state(consumer, state)]
        }
        MuxEvent::Error { consumers, message } => {
            let names: Vec<&str> = consumers.iter().map(ConsumerId::as_str).collect();
            let mut commands = vec![HostCommand::log(format!(
                "Got unhandled error ({}): {message}",
                names.join(", ")
            ))];
            commands.extend(
                consumers
                    .into_iter()
                    .map(|context| HostCommand::ShowAlert { context }),
            );
            commands
        }
        MuxEvent::Log { message } => vec![HostCommand::log(message)],
        MuxEvent::Ready { consumer } => vec![HostCommand::ShowOk { context: consumer }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::MockConnector;
    use crate::application::MuxError;
    use crate::domain::{MultiplexerConfig, SMART_SWITCH_ACTION};
    use serde_json::json;
    use std::sync::Arc;
    use switchlink_core::{ConnectionKey, DisplayState};

    const CONFIG: &str =
        r#"{"ip":"10.0.0.9","port":28082,"entityId":5,"playerId":1,"playerToken":2}"#;

    fn manager() -> (
        SessionManager,
        ConnectionRegistry,
        mpsc::UnboundedReceiver<MuxEvent>,
        mpsc::UnboundedReceiver<HostCommand>,
    ) {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(MuxError::Transport("refused".into())));
        let (registry, events) =
            ConnectionRegistry::new(Arc::new(connector), MultiplexerConfig::default());
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let manager = SessionManager::new(registry.clone(), commands_tx, SMART_SWITCH_ACTION);
        (manager, registry, events, commands)
    }

    fn settings_with_config() -> Settings {
        let mut settings = Settings::new();
        settings.insert(CONNECTION_CONFIG_KEY.into(), json!(CONFIG));
        settings
    }

    fn key() -> ConnectionKey {
        ConnectionKey::new("10.0.0.9", 28082)
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_with_config_attaches_to_registry() {
        // Arrange
        let (mut manager, registry, _events, _commands) = manager();

        // Act
        manager.attach(ConsumerId::new("c1"), settings_with_config());

        // Assert
        let conn = registry.get(&key()).expect("connection created");
        assert_eq!(conn.ref_count(), 1);
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_without_config_is_tracked_but_not_attached() {
        let (mut manager, registry, _events, _commands) = manager();

        manager.attach(ConsumerId::new("c1"), Settings::new());

        assert!(registry.is_empty());
        assert_eq!(manager.session_count(), 1);
        assert!(manager.config_of(&ConsumerId::new("c1")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_releases_reference() {
        let (mut manager, registry, _events, _commands) = manager();
        let c1 = ConsumerId::new("c1");
        manager.attach(c1.clone(), settings_with_config());

        manager.detach(&c1);

        assert_eq!(registry.get(&key()).unwrap().ref_count(), 0);
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_without_config_reports_error_to_that_button() {
        // Arrange
        let (mut manager, _registry, mut events, _commands) = manager();
        let c1 = ConsumerId::new("c1");
        manager.attach(c1.clone(), Settings::new());

        // Act
        manager.user_toggled(&c1, true);

        // Assert
        assert_eq!(
            events.recv().await,
            Some(MuxEvent::error(vec![c1], NO_CONFIG_MESSAGE))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_change_is_persisted_back_to_host() {
        // Arrange
        let (mut manager, _registry, _events, mut commands) = manager();
        let c1 = ConsumerId::new("c1");
        manager.attach(c1.clone(), Settings::new());

        // Act
        manager.settings_changed(&c1, "label".into(), json!("Lights"));

        // Assert
        match commands.recv().await {
            Some(HostCommand::SetSettings { context, payload }) => {
                assert_eq!(context, c1);
                assert_eq!(payload.get("label"), Some(&json!("Lights")));
            }
            other => panic!("expected SetSettings, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_config_change_moves_button_to_new_server() {
        // Arrange
        let (mut manager, registry, _events, _commands) = manager();
        let c1 = ConsumerId::new("c1");
        manager.attach(c1.clone(), settings_with_config());
        let new_config =
            r#"{"ip":"10.0.0.10","port":28082,"entityId":6,"playerId":1,"playerToken":2}"#;

        // Act
        manager.settings_changed(&c1, CONNECTION_CONFIG_KEY.into(), json!(new_config));

        // Assert
        assert_eq!(registry.get(&key()).unwrap().ref_count(), 0);
        let moved = registry
            .get(&ConnectionKey::new("10.0.0.10", 28082))
            .expect("new connection");
        assert_eq!(moved.subscribers_of(switchlink_core::EntityId(6)), vec![c1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigured_button_hears_first_connect_failure() {
        // Arrange
        let (mut manager, _registry, mut events, _commands) = manager();
        let c1 = ConsumerId::new("c1");
        manager.attach(c1.clone(), Settings::new());

        // Act
        manager.settings_changed(&c1, CONNECTION_CONFIG_KEY.into(), json!(CONFIG));

        // Assert: reported well before the next reconnect attempt
        let expected = MuxError::Transport("refused".into()).to_string();
        let reported = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Some(MuxEvent::Error { consumers, message }) if message == expected => {
                        return consumers;
                    }
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("failure reported without waiting for a reconnect");
        assert_eq!(reported, vec![c1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_other_actions_are_ignored() {
        let (mut manager, registry, _events, _commands) = manager();

        manager.handle_event(HostEvent::WillAppear {
            action: "com.example.other".into(),
            context: ConsumerId::new("c1"),
            payload: crate::domain::host_messages::AppearancePayload {
                settings: settings_with_config(),
            },
        });

        assert_eq!(manager.session_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_error_event_becomes_log_plus_alerts() {
        // Arrange
        let event = MuxEvent::error(
            vec![ConsumerId::new("a"), ConsumerId::new("b")],
            "Connection closed",
        );

        // Act
        let commands = host_commands_for(event);

        // Assert
        assert_eq!(
            commands,
            vec![
                HostCommand::log("Got unhandled error (a, b): Connection closed"),
                HostCommand::ShowAlert {
                    context: ConsumerId::new("a")
                },
                HostCommand::ShowAlert {
                    context: ConsumerId::new("b")
                },
            ]
        );
    }

    #[test]
    fn test_state_and_ready_events_translate_one_to_one() {
        assert_eq!(
            host_commands_for(MuxEvent::StateChanged {
                consumer: ConsumerId::new("a"),
                state: DisplayState::On,
            }),
            vec![HostCommand::set_state(ConsumerId::new("a"), DisplayState::On)]
        );
        assert_eq!(
            host_commands_for(MuxEvent::Ready {
                consumer: ConsumerId::new("a")
            }),
            vec![HostCommand::ShowOk {
                context: ConsumerId::new("a")
            }]
        );
    }
}
