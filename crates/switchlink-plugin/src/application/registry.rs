//! Connection registry: one live [`Connection`] per [`ConnectionKey`].
//!
//! # Reference counting (for beginners)
//!
//! Many buttons may point at the same server. The registry hands all of them
//! the same connection and counts how many distinct consumers are attached.
//! When the count drops to zero the connection is not closed immediately:
//! a grace timer starts, and only if nobody re-attaches before it fires is the
//! connection closed and forgotten. Switching Stream Deck pages (which detaches
//! and re-attaches every button) therefore does not churn connections.
//!
//! `attach`, `detach` and `get` never suspend; connection establishment and
//! teardown happen on background tasks. They must be called from within a
//! Tokio runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use switchlink_core::{ConnectionKey, Credentials, EntityId};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::connection::{run_driver, Connection, ConnectionState, DriverContext};
use crate::application::gateway::refresh_entity;
use crate::application::subscriptions::EntityQuery;
use crate::application::transport::Connector;
use crate::domain::{ConsumerId, MultiplexerConfig, MuxEvent};

struct Shared {
    connections: Mutex<HashMap<ConnectionKey, Arc<Connection>>>,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<MuxEvent>,
    config: MultiplexerConfig,
}

/// Cheaply clonable handle to the registry state.
#[derive(Clone)]
pub struct ConnectionRegistry {
    shared: Arc<Shared>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    ///
    /// Returns the registry and the receiving end of its event channel; every
    /// state change, error and lifecycle log is reported there.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: MultiplexerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MuxEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let registry = Self {
            shared: Arc::new(Shared {
                connections: Mutex::new(HashMap::new()),
                connector,
                events,
                config,
            }),
        };
        (registry, rx)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Arc<Connection>>> {
        self.shared
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &MultiplexerConfig {
        &self.shared.config
    }

    /// Sender half of the event channel, for collaborators that report on
    /// behalf of consumers.
    pub fn events(&self) -> mpsc::UnboundedSender<MuxEvent> {
        self.shared.events.clone()
    }

    fn driver_context(&self) -> DriverContext {
        DriverContext {
            connector: Arc::clone(&self.shared.connector),
            events: self.shared.events.clone(),
            reconnect_delay: self.shared.config.reconnect_delay(),
            request_timeout: self.shared.config.request_timeout(),
        }
    }

    /// Subscribes `consumer` to `entity_id` on the connection for `key`,
    /// creating the connection if needed.
    ///
    /// Idempotent per `(key, entity_id, consumer)`. Cancels a pending
    /// teardown. If the connection is already open, the entity is queried at
    /// once and the result goes to `consumer`.
    pub fn attach(
        &self,
        key: &ConnectionKey,
        entity_id: EntityId,
        consumer: &ConsumerId,
        credentials: Credentials,
    ) -> Arc<Connection> {
        let mut connections = self.lock();
        let conn = match connections.get(key) {
            Some(existing) => Arc::clone(existing),
            None => {
                let conn = Arc::new(Connection::new(key.clone()));
                connections.insert(key.clone(), Arc::clone(&conn));
                info!("connection {key}: created ({})", conn.id());
                let handle = tokio::spawn(run_driver(Arc::clone(&conn), self.driver_context()));
                conn.set_driver(handle);
                conn
            }
        };

        if conn.cancel_teardown() {
            debug!("connection {key}: teardown cancelled by {consumer}");
        }
        conn.subscribe(entity_id, consumer.clone(), credentials);
        drop(connections);

        if conn.state() == ConnectionState::Open {
            tokio::spawn(refresh_entity(
                Arc::clone(&conn),
                EntityQuery {
                    entity_id,
                    credentials,
                    recipients: vec![consumer.clone()],
                },
                self.shared.events.clone(),
                self.shared.config.request_timeout(),
            ));
        }
        conn
    }

    /// Removes the subscription. When the connection's last consumer leaves,
    /// schedules its teardown after the grace period.
    pub fn detach(&self, key: &ConnectionKey, entity_id: EntityId, consumer: &ConsumerId) {
        let connections = self.lock();
        let Some(conn) = connections.get(key).map(Arc::clone) else {
            debug!("connection {key}: detach from unknown connection ignored");
            return;
        };

        conn.unsubscribe(entity_id, consumer);
        if conn.ref_count() > 0 || conn.has_pending_teardown() {
            return;
        }

        let grace = self.shared.config.grace_period();
        debug!("connection {key}: no consumers left, teardown in {grace:?}");
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let key = key.clone();
        let id = conn.id();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(shared) = weak.upgrade() {
                ConnectionRegistry { shared }.teardown(&key, id);
            }
        });
        conn.set_teardown(handle);
    }

    /// Looks up the live connection for `key` without side effects.
    pub fn get(&self, key: &ConnectionKey) -> Option<Arc<Connection>> {
        self.lock().get(key).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Closes and forgets every connection, failing their pending requests
    /// with [`ConnectionRemoved`](crate::application::MuxError::ConnectionRemoved).
    pub fn close_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (key, conn) in drained {
            let failed = conn.close();
            info!("connection {key}: closed at shutdown ({failed} pending request(s) failed)");
        }
    }

    /// Fired by the grace timer. Removes the connection only if it is still
    /// the same instance and still has no consumers.
    fn teardown(&self, key: &ConnectionKey, id: Uuid) {
        let mut connections = self.lock();
        let removable = connections
            .get(key)
            .is_some_and(|conn| conn.id() == id && conn.ref_count() == 0);
        if !removable {
            return;
        }
        let Some(conn) = connections.remove(key) else {
            return;
        };
        drop(connections);

        let failed = conn.close();
        info!("connection {key}: torn down after grace period ({failed} pending request(s) failed)");
        let _ = self.shared.events.send(MuxEvent::log(format!(
            "Cancelling connection to {}",
            key.url()
        )));
    }
}
