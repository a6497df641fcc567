//! Request/response exchanges over a shared connection.
//!
//! [`request`] is the primitive: it sends one request on an open connection
//! and resolves with exactly one outcome, whichever comes first:
//!
//! | trigger                      | outcome                        |
//! |------------------------------|--------------------------------|
//! | matching response arrives    | `Ok(response)`                 |
//! | transport drops              | `Err(ConnectionLost)`          |
//! | connection torn down         | `Err(ConnectionRemoved)`       |
//! | `timeout` elapses            | `Err(Timeout)`                 |
//! | `cancel` fires               | `Err(Cancelled)`               |
//!
//! In every case the pending entry is gone when `request` returns, including
//! when the caller drops the future early.
//!
//! [`RequestGateway`] layers "wait until ready" and typed helpers for the two
//! operations buttons need on top of the primitive.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use switchlink_core::{
    AppResponse, ConnectionKey, Credentials, DisplayState, EntityId, RequestBody, Seq,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::connection::Connection;
use crate::application::error::MuxError;
use crate::application::pending::Ticket;
use crate::application::registry::ConnectionRegistry;
use crate::application::subscriptions::EntityQuery;
use crate::domain::MuxEvent;

/// Removes a pending entry when the request future finishes or is dropped.
struct PendingGuard<'a> {
    conn: &'a Connection,
    seq: Seq,
    ticket: Ticket,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.conn.forget(self.seq, self.ticket);
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => sleep(duration).await,
        None => future::pending().await,
    }
}

async fn cancelled_or_forever(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => future::pending().await,
    }
}

/// Sends one request on `conn` and waits for its outcome.
///
/// The connection must already be open; use
/// [`RequestGateway::send_when_ready`] to wait for that first.
///
/// # Errors
///
/// See the module table. Additionally returns [`MuxError::Transport`] if the
/// connection is not open, and [`MuxError::Cancelled`] without sending if
/// `cancel` has already fired.
pub async fn request(
    conn: &Connection,
    entity_id: EntityId,
    body: RequestBody,
    credentials: Credentials,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<AppResponse, MuxError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(MuxError::Cancelled);
    }

    let (seq, ticket, reply) = conn.begin_request(entity_id, body, credentials)?;
    let _guard = PendingGuard { conn, seq, ticket };
    debug!(
        "connection {}: sent {} seq {seq} for entity {entity_id}",
        conn.key(),
        body.name()
    );

    tokio::select! {
        biased;
        outcome = reply => outcome.unwrap_or(Err(MuxError::ConnectionRemoved)),
        () = sleep_or_forever(timeout) => Err(MuxError::Timeout),
        () = cancelled_or_forever(cancel) => Err(MuxError::Cancelled),
    }
}

/// Reads the switch value out of a `getEntityInfo` response.
///
/// # Errors
///
/// [`MuxError::EntityNotFound`] if the response carries no entity info.
pub fn entity_value(response: &AppResponse) -> Result<bool, MuxError> {
    response
        .entity_info
        .map(|info| info.payload.value)
        .ok_or(MuxError::EntityNotFound)
}

/// Checks that a mutating request was acknowledged.
///
/// # Errors
///
/// [`MuxError::ApplicationFailure`] if the server did not send `success`.
pub fn ensure_success(response: &AppResponse, operation: &str) -> Result<(), MuxError> {
    if response.success {
        return Ok(());
    }
    let detail = response
        .error
        .as_deref()
        .map(|e| format!(" ({e})"))
        .unwrap_or_default();
    Err(MuxError::ApplicationFailure(format!(
        "response indicated {operation} was not successful{detail}"
    )))
}

/// Queries one entity and reports the result to its subscribers.
///
/// Spawned by the connection driver on open and by the registry when a
/// consumer attaches to an already-open connection. Failures are reported as
/// [`MuxEvent::Error`]; nothing escapes the task.
pub(crate) async fn refresh_entity(
    conn: Arc<Connection>,
    query: EntityQuery,
    events: mpsc::UnboundedSender<MuxEvent>,
    timeout: Duration,
) {
    let result = request(
        &conn,
        query.entity_id,
        RequestBody::GetEntityInfo,
        query.credentials,
        Some(timeout),
        None,
    )
    .await
    .and_then(|response| entity_value(&response));

    // Only consumers still subscribed when the answer arrives hear about it.
    let current = conn.subscribers_of(query.entity_id);
    let recipients: Vec<_> = query
        .recipients
        .into_iter()
        .filter(|c| current.contains(c))
        .collect();

    match result {
        Ok(value) => {
            let state = DisplayState::from_value(value);
            for consumer in recipients {
                let _ = events.send(MuxEvent::StateChanged { consumer, state });
            }
        }
        // Torn down underneath us; there is nobody left to tell.
        Err(MuxError::ConnectionRemoved) => {}
        Err(e) => {
            warn!(
                "connection {}: refreshing entity {} failed: {e}",
                conn.key(),
                query.entity_id
            );
            let _ = events.send(MuxEvent::error(
                recipients,
                format!("Failed to refresh entity {}: {e}", query.entity_id),
            ));
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────────

/// Request entry point used by consumer sessions.
#[derive(Clone)]
pub struct RequestGateway {
    registry: ConnectionRegistry,
    timeout: Duration,
}

impl RequestGateway {
    /// Creates a gateway whose overall deadline is the registry's configured
    /// request timeout.
    pub fn new(registry: ConnectionRegistry) -> Self {
        let timeout = registry.config().request_timeout();
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits for the connection behind `key` to be ready, then sends.
    ///
    /// The gateway's timeout bounds the whole operation, waiting included.
    ///
    /// # Errors
    ///
    /// [`MuxError::ConnectionRemoved`] if no connection is registered for
    /// `key`; the connect error if the pending attempt fails; otherwise as
    /// [`request`].
    pub async fn send_when_ready(
        &self,
        key: &ConnectionKey,
        entity_id: EntityId,
        body: RequestBody,
        credentials: Credentials,
        cancel: Option<&CancellationToken>,
    ) -> Result<AppResponse, MuxError> {
        let conn = self.registry.get(key).ok_or(MuxError::ConnectionRemoved)?;
        let deadline = Instant::now() + self.timeout;

        tokio::select! {
            biased;
            ready = conn.wait_ready() => ready?,
            () = sleep_until(deadline) => return Err(MuxError::Timeout),
            () = cancelled_or_forever(cancel) => return Err(MuxError::Cancelled),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        request(&conn, entity_id, body, credentials, Some(remaining), cancel).await
    }

    /// Fetches the current switch value.
    ///
    /// # Errors
    ///
    /// As [`send_when_ready`](Self::send_when_ready), plus
    /// [`MuxError::EntityNotFound`].
    pub async fn get_entity_value(
        &self,
        key: &ConnectionKey,
        entity_id: EntityId,
        credentials: Credentials,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, MuxError> {
        let response = self
            .send_when_ready(key, entity_id, RequestBody::GetEntityInfo, credentials, cancel)
            .await?;
        entity_value(&response)
    }

    /// Drives the switch to `value`.
    ///
    /// # Errors
    ///
    /// As [`send_when_ready`](Self::send_when_ready), plus
    /// [`MuxError::ApplicationFailure`] if the server did not acknowledge.
    pub async fn set_entity_value(
        &self,
        key: &ConnectionKey,
        entity_id: EntityId,
        credentials: Credentials,
        value: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), MuxError> {
        let body = RequestBody::SetEntityValue { value };
        let response = self
            .send_when_ready(key, entity_id, body, credentials, cancel)
            .await?;
        ensure_success(&response, body.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchlink_core::{PlayerId, PlayerToken};

    fn creds() -> Credentials {
        Credentials {
            player_id: PlayerId(1),
            player_token: PlayerToken(2),
        }
    }

    #[test]
    fn test_entity_value_requires_entity_info() {
        assert_eq!(entity_value(&AppResponse::entity_info(1, true)), Ok(true));
        assert_eq!(
            entity_value(&AppResponse::success(1)),
            Err(MuxError::EntityNotFound)
        );
    }

    #[test]
    fn test_ensure_success_reports_server_error_text() {
        assert_eq!(ensure_success(&AppResponse::success(1), "setEntityValue"), Ok(()));

        let err = ensure_success(&AppResponse::error(1, "not_found"), "setEntityValue")
            .unwrap_err();

        assert_eq!(
            err,
            MuxError::ApplicationFailure(
                "response indicated setEntityValue was not successful (not_found)".into()
            )
        );
    }

    #[tokio::test]
    async fn test_request_with_fired_token_is_cancelled_without_sending() {
        // Arrange
        let conn = Connection::new(ConnectionKey::new("h", 1));
        let token = CancellationToken::new();
        token.cancel();

        // Act
        let result = request(
            &conn,
            EntityId(1),
            RequestBody::GetEntityInfo,
            creds(),
            None,
            Some(&token),
        )
        .await;

        // Assert
        assert_eq!(result, Err(MuxError::Cancelled));
        assert_eq!(conn.next_sequence(), 1, "no number consumed");
    }

    #[tokio::test]
    async fn test_request_on_connecting_connection_is_transport_error() {
        let conn = Connection::new(ConnectionKey::new("h", 1));

        let result = request(
            &conn,
            EntityId(1),
            RequestBody::GetEntityInfo,
            creds(),
            None,
            None,
        )
        .await;

        assert!(matches!(result, Err(MuxError::Transport(_))));
    }
}
