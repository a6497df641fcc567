//! One shared connection to one game server.
//!
//! A [`Connection`] owns everything that is per-server: the transport's
//! outbound half, the sequence counter, the pending-request table, the
//! subscription table and the ready gate. A single driver task per connection
//! ([`run_driver`]) establishes the transport, pumps inbound frames, and
//! reconnects after a fixed delay when the transport drops.
//!
//! # State machine
//!
//! ```text
//!            connect ok                 transport drops
//! Connecting ──────────► Open ──────────────────────────► Connecting
//!     │  ▲                 │     (pending fail with ConnectionLost,
//!     │  └─ connect fails  │      seq reset to 0, new ready gate,
//!     │     (retry later)  │      retry after reconnect delay)
//!     │                    │
//!     └────────┬───────────┘
//!              ▼  registry teardown
//!            Closed  (final: pending fail with ConnectionRemoved)
//! ```
//!
//! # Locking
//!
//! State sits behind a `std::sync::Mutex` that is never held across an
//! `.await`. When both are needed, the registry map is locked before any
//! connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use switchlink_core::protocol::SequenceCounter;
use switchlink_core::{
    decode_message, encode_request, AppMessage, AppRequest, ConnectionKey, Credentials,
    DisplayState, EntityId, RequestBody, Seq,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::MuxError;
use crate::application::gateway::refresh_entity;
use crate::application::pending::{PendingTable, ResponseResult, Ticket};
use crate::application::ready::{wait_ready, GateState, ReadyGate};
use crate::application::subscriptions::{EntityQuery, SubscriptionTable};
use crate::application::transport::{Connector, TransportLink};
use crate::domain::{ConsumerId, MuxEvent};

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Inner {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    sequence: SequenceCounter,
    pending: PendingTable,
    subscriptions: SubscriptionTable,
    gate: ReadyGate,
    driver: Option<JoinHandle<()>>,
    teardown: Option<JoinHandle<()>>,
}

/// A shared, reference-counted server connection.
///
/// Obtained from [`ConnectionRegistry::attach`](crate::application::ConnectionRegistry::attach).
/// Consumers can observe it and issue requests through
/// [`gateway::request`](crate::application::gateway::request); all mutation
/// goes through the registry.
pub struct Connection {
    id: Uuid,
    key: ConnectionKey,
    inner: Mutex<Inner>,
}

impl Connection {
    pub(crate) fn new(key: ConnectionKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                outbound: None,
                sequence: SequenceCounter::new(),
                pending: PendingTable::new(),
                subscriptions: SubscriptionTable::new(),
                gate: ReadyGate::new(),
                driver: None,
                teardown: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Observation ───────────────────────────────────────────────────────────

    /// Identity of this instance. A replacement connection for the same key
    /// gets a different id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Number of distinct consumers attached.
    pub fn ref_count(&self) -> usize {
        self.lock().subscriptions.consumer_count()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Consumers subscribed to `entity_id`, in stable order.
    pub fn subscribers_of(&self, entity_id: EntityId) -> Vec<ConsumerId> {
        self.lock().subscriptions.consumers_of(entity_id)
    }

    /// Every consumer attached to this connection.
    pub fn consumers(&self) -> Vec<ConsumerId> {
        self.lock().subscriptions.all_consumers()
    }

    /// The sequence number the next request will try first.
    pub fn next_sequence(&self) -> Seq {
        self.lock().sequence.peek()
    }

    pub fn has_pending_teardown(&self) -> bool {
        self.lock().teardown.is_some()
    }

    /// Receiver for the current transport generation's ready gate.
    pub fn ready(&self) -> watch::Receiver<GateState> {
        self.lock().gate.subscribe()
    }

    /// Waits until the current transport generation is open.
    ///
    /// # Errors
    ///
    /// Fails with the connect error if the attempt this generation was
    /// waiting for failed, or [`MuxError::ConnectionRemoved`] if the connection
    /// was torn down.
    pub async fn wait_ready(&self) -> Result<(), MuxError> {
        let rx = self.ready();
        wait_ready(rx).await
    }

    // ── Registry-side mutation ───────────────────────────────────────────────

    /// Records a subscription. Returns `true` if the pair is new.
    pub(crate) fn subscribe(
        &self,
        entity_id: EntityId,
        consumer: ConsumerId,
        credentials: Credentials,
    ) -> bool {
        self.lock()
            .subscriptions
            .insert(entity_id, consumer, credentials)
    }

    pub(crate) fn unsubscribe(&self, entity_id: EntityId, consumer: &ConsumerId) -> bool {
        self.lock().subscriptions.remove(entity_id, consumer)
    }

    pub(crate) fn set_driver(&self, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            handle.abort();
            return;
        }
        if let Some(previous) = inner.driver.replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn set_teardown(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.lock().teardown.replace(handle) {
            previous.abort();
        }
    }

    /// Cancels a scheduled teardown. Returns `true` if one was pending.
    pub(crate) fn cancel_teardown(&self) -> bool {
        match self.lock().teardown.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Final close: stops the driver, drops the transport and fails every
    /// pending request with [`MuxError::ConnectionRemoved`].
    ///
    /// Returns the number of pending requests that were failed. Idempotent.
    pub(crate) fn close(&self) -> usize {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return 0;
        }
        inner.state = ConnectionState::Closed;
        inner.outbound = None;
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        if let Some(teardown) = inner.teardown.take() {
            teardown.abort();
        }
        inner.gate.fail(MuxError::ConnectionRemoved);
        inner.pending.fail_all(&MuxError::ConnectionRemoved)
    }

    // ── Driver-side transitions ──────────────────────────────────────────────

    /// `Connecting → Open`. Returns the entity queries to replay, or `None` if
    /// the connection was closed while the handshake was in flight.
    fn on_open(&self, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Option<Vec<EntityQuery>> {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return None;
        }
        inner.state = ConnectionState::Open;
        inner.outbound = Some(outbound);
        inner.gate.open();
        Some(inner.subscriptions.queries())
    }

    /// `Open → Connecting` after the transport dropped. Returns the number of
    /// pending requests failed with [`MuxError::ConnectionLost`].
    fn on_lost(&self) -> usize {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return 0;
        }
        inner.state = ConnectionState::Connecting;
        inner.outbound = None;
        let failed = inner.pending.fail_all(&MuxError::ConnectionLost);
        inner.sequence.reset();
        inner.gate = ReadyGate::new();
        failed
    }

    /// A connect attempt failed: settle the current gate with the error and
    /// start a fresh one for the next attempt.
    fn on_connect_failed(&self, error: MuxError) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return;
        }
        inner.gate.fail(error);
        inner.gate = ReadyGate::new();
    }

    /// Routes one inbound frame.
    ///
    /// Responses resolve their pending request (unmatched ones are dropped).
    /// `entityChanged` broadcasts become one [`MuxEvent::StateChanged`] per
    /// current subscriber of that entity.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Decode`] if the frame is not a valid message. The
    /// connection is unaffected.
    pub(crate) fn route(&self, frame: &[u8]) -> Result<Vec<MuxEvent>, MuxError> {
        let message = decode_message(frame)?;
        let mut inner = self.lock();
        match message {
            AppMessage::Response(response) => {
                let seq = response.seq;
                if !inner.pending.resolve(response) {
                    debug!("connection {}: no pending request for seq {seq}, ignoring", self.key);
                }
                Ok(Vec::new())
            }
            AppMessage::Broadcast(broadcast) => {
                let Some(changed) = broadcast.entity_changed else {
                    return Ok(Vec::new());
                };
                let state = DisplayState::from_value(changed.payload.value);
                Ok(inner
                    .subscriptions
                    .consumers_of(changed.entity_id)
                    .into_iter()
                    .map(|consumer| MuxEvent::StateChanged { consumer, state })
                    .collect())
            }
        }
    }

    // ── Gateway-side request plumbing ────────────────────────────────────────

    /// Allocates a sequence number, registers a waiter and sends the frame.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Transport`] if the connection is not open or the
    /// transport rejected the frame. In the latter case the sequence number is
    /// still consumed.
    pub(crate) fn begin_request(
        &self,
        entity_id: EntityId,
        body: RequestBody,
        credentials: Credentials,
    ) -> Result<(Seq, Ticket, oneshot::Receiver<ResponseResult>), MuxError> {
        let mut guard = self.lock();
        let Inner {
            state,
            outbound,
            sequence,
            pending,
            ..
        } = &mut *guard;

        let outbound = match (*state, outbound.as_ref()) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => {
                return Err(MuxError::Transport(format!(
                    "connection to {} is not open",
                    self.key
                )))
            }
        };

        let seq = sequence.allocate(|candidate| pending.contains(candidate));
        let frame = encode_request(&AppRequest {
            seq,
            player_id: credentials.player_id,
            player_token: credentials.player_token,
            entity_id,
            body,
        });
        let (ticket, reply) = pending.insert(seq);
        if outbound.send(frame).is_err() {
            pending.forget(seq, ticket);
            return Err(MuxError::Transport(format!(
                "transport to {} is closed",
                self.key
            )));
        }
        Ok((seq, ticket, reply))
    }

    /// Drops the waiter for `seq` if it still belongs to `ticket`.
    pub(crate) fn forget(&self, seq: Seq, ticket: Ticket) -> bool {
        self.lock().pending.forget(seq, ticket)
    }
}

// ── Driver task ───────────────────────────────────────────────────────────────

/// Everything the driver needs besides the connection itself.
#[derive(Clone)]
pub(crate) struct DriverContext {
    pub connector: Arc<dyn Connector>,
    pub events: mpsc::UnboundedSender<MuxEvent>,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
}

impl DriverContext {
    fn emit(&self, event: MuxEvent) {
        // The receiver only goes away at shutdown.
        let _ = self.events.send(event);
    }
}

/// Connect / pump / reconnect loop for one connection.
///
/// Runs until the connection is closed by the registry, which also aborts
/// this task.
pub(crate) async fn run_driver(conn: Arc<Connection>, ctx: DriverContext) {
    let url = conn.key().url();
    loop {
        if conn.is_closed() {
            return;
        }

        info!("connection {}: connecting to {url}", conn.key());
        ctx.emit(MuxEvent::log(format!("Connecting to {url}...")));

        match ctx.connector.connect(conn.key()).await {
            Ok(TransportLink {
                outbound,
                mut inbound,
            }) => {
                let Some(queries) = conn.on_open(outbound) else {
                    return;
                };
                info!("connection {}: open", conn.key());
                ctx.emit(MuxEvent::log(format!(
                    "Successfully opened connection to {url}"
                )));

                for query in queries {
                    tokio::spawn(refresh_entity(
                        Arc::clone(&conn),
                        query,
                        ctx.events.clone(),
                        ctx.request_timeout,
                    ));
                }

                while let Some(frame) = inbound.recv().await {
                    match conn.route(&frame) {
                        Ok(events) => events.into_iter().for_each(|e| ctx.emit(e)),
                        Err(e) => {
                            warn!("connection {}: {e}", conn.key());
                            ctx.emit(MuxEvent::error(
                                conn.consumers(),
                                format!("Error handling message from {url}: {e}"),
                            ));
                        }
                    }
                }

                if conn.is_closed() {
                    return;
                }
                let failed = conn.on_lost();
                warn!(
                    "connection {}: closed unexpectedly, {failed} pending request(s) failed",
                    conn.key()
                );
                ctx.emit(MuxEvent::log(format!(
                    "Connection to {url} closed unexpectedly, scheduling reconnect"
                )));
            }
            Err(e) => {
                if conn.is_closed() {
                    return;
                }
                warn!("connection {}: connect failed: {e}", conn.key());
                conn.on_connect_failed(e.clone());
                ctx.emit(MuxEvent::error(
                    conn.consumers(),
                    format!("Failed to connect to {url}: {e}"),
                ));
            }
        }

        tokio::time::sleep(ctx.reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchlink_core::{encode_message, AppResponse, PlayerId, PlayerToken};

    fn creds() -> Credentials {
        Credentials {
            player_id: PlayerId(1),
            player_token: PlayerToken(2),
        }
    }

    fn open_connection() -> (Connection, mpsc::UnboundedReceiver<Vec<u8>>) {
        let conn = Connection::new(ConnectionKey::new("h", 1));
        let (tx, rx) = mpsc::unbounded_channel();
        conn.on_open(tx).expect("not closed");
        (conn, rx)
    }

    #[test]
    fn test_new_connection_is_connecting_with_seq_one() {
        let conn = Connection::new(ConnectionKey::new("h", 1));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.next_sequence(), 1);
        assert_eq!(conn.ref_count(), 0);
    }

    #[test]
    fn test_begin_request_rejected_while_connecting() {
        let conn = Connection::new(ConnectionKey::new("h", 1));

        let result = conn.begin_request(EntityId(1), RequestBody::GetEntityInfo, creds());

        assert!(matches!(result, Err(MuxError::Transport(_))));
        assert_eq!(conn.next_sequence(), 1, "a rejected send must not consume a number");
    }

    #[test]
    fn test_begin_request_sends_frame_with_allocated_seq() {
        // Arrange
        let (conn, mut wire) = open_connection();

        // Act
        let (seq, _, _reply) = conn
            .begin_request(EntityId(9), RequestBody::GetEntityInfo, creds())
            .unwrap();

        // Assert
        assert_eq!(seq, 1);
        let sent = switchlink_core::decode_request(&wire.try_recv().unwrap()).unwrap();
        assert_eq!(sent.seq, 1);
        assert_eq!(sent.entity_id, EntityId(9));
        assert_eq!(conn.pending_count(), 1);
    }

    #[test]
    fn test_send_failure_consumes_seq_and_leaves_no_entry() {
        let (conn, wire) = open_connection();
        drop(wire);

        let result = conn.begin_request(EntityId(9), RequestBody::GetEntityInfo, creds());

        assert!(matches!(result, Err(MuxError::Transport(_))));
        assert_eq!(conn.pending_count(), 0);
        assert_eq!(conn.next_sequence(), 2);
    }

    #[test]
    fn test_route_response_resolves_pending_entry() {
        // Arrange
        let (conn, _wire) = open_connection();
        let (seq, _, mut reply) = conn
            .begin_request(EntityId(9), RequestBody::GetEntityInfo, creds())
            .unwrap();
        let frame = encode_message(&AppMessage::Response(AppResponse::entity_info(seq, true)));

        // Act
        let events = conn.route(&frame).unwrap();

        // Assert
        assert!(events.is_empty());
        assert_eq!(
            reply.try_recv().unwrap(),
            Ok(AppResponse::entity_info(seq, true))
        );
        assert_eq!(conn.pending_count(), 0);
    }

    #[test]
    fn test_route_broadcast_reaches_only_entity_subscribers() {
        // Arrange
        let (conn, _wire) = open_connection();
        conn.subscribe(EntityId(5), ConsumerId::new("c1"), creds());
        conn.subscribe(EntityId(7), ConsumerId::new("c2"), creds());
        let frame = encode_message(&AppMessage::entity_changed(EntityId(5), false));

        // Act
        let events = conn.route(&frame).unwrap();

        // Assert
        assert_eq!(
            events,
            vec![MuxEvent::StateChanged {
                consumer: ConsumerId::new("c1"),
                state: DisplayState::Off,
            }]
        );
    }

    #[test]
    fn test_route_garbage_is_a_decode_error() {
        let (conn, _wire) = open_connection();
        assert!(matches!(conn.route(&[0xFF]), Err(MuxError::Decode(_))));
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[test]
    fn test_on_lost_fails_pending_and_resets_seq() {
        // Arrange
        let (conn, _wire) = open_connection();
        let (_, _, mut first) = conn
            .begin_request(EntityId(1), RequestBody::GetEntityInfo, creds())
            .unwrap();
        let (_, _, mut second) = conn
            .begin_request(EntityId(1), RequestBody::GetEntityInfo, creds())
            .unwrap();

        // Act
        let failed = conn.on_lost();

        // Assert
        assert_eq!(failed, 2);
        assert_eq!(first.try_recv().unwrap(), Err(MuxError::ConnectionLost));
        assert_eq!(second.try_recv().unwrap(), Err(MuxError::ConnectionLost));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.next_sequence(), 0);
        assert_eq!(*conn.ready().borrow(), GateState::Pending);
    }

    #[test]
    fn test_close_fails_pending_with_removed_and_is_idempotent() {
        let (conn, _wire) = open_connection();
        let (_, _, mut reply) = conn
            .begin_request(EntityId(1), RequestBody::GetEntityInfo, creds())
            .unwrap();

        assert_eq!(conn.close(), 1);
        assert_eq!(conn.close(), 0);
        assert_eq!(reply.try_recv().unwrap(), Err(MuxError::ConnectionRemoved));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_on_open_after_close_is_refused() {
        let conn = Connection::new(ConnectionKey::new("h", 1));
        conn.close();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(conn.on_open(tx).is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connect_failure_settles_old_gate_and_starts_new_one() {
        // Arrange
        let conn = Connection::new(ConnectionKey::new("h", 1));
        let old = conn.ready();

        // Act
        conn.on_connect_failed(MuxError::Transport("refused".into()));

        // Assert
        assert_eq!(
            *old.borrow(),
            GateState::Failed(MuxError::Transport("refused".into()))
        );
        assert_eq!(*conn.ready().borrow(), GateState::Pending);
    }
}
