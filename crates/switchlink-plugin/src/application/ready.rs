//! Per-generation "ready" gate.
//!
//! Callers that want to send as soon as the connection is usable wait on the
//! gate instead of polling the connection state. A connection creates a fresh
//! gate for every transport generation; the previous gate is always settled
//! (open or failed) before it is replaced, so no waiter is left hanging.

use tokio::sync::watch;

use crate::application::error::MuxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Open,
    Failed(MuxError),
}

#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<GateState>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Pending);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.tx.subscribe()
    }

    pub fn open(&self) {
        self.tx.send_replace(GateState::Open);
    }

    /// Settles the gate with an error, unless it has already settled.
    pub fn fail(&self, error: MuxError) {
        self.tx.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = GateState::Failed(error);
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> GateState {
        self.tx.borrow().clone()
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits until the gate behind `rx` settles.
///
/// # Errors
///
/// Returns the gate's failure, or [`MuxError::ConnectionRemoved`] if the gate
/// was dropped without settling.
pub async fn wait_ready(mut rx: watch::Receiver<GateState>) -> Result<(), MuxError> {
    let settled = rx
        .wait_for(|state| *state != GateState::Pending)
        .await
        .map_err(|_| MuxError::ConnectionRemoved)?
        .clone();
    match settled {
        GateState::Failed(error) => Err(error),
        GateState::Open | GateState::Pending => Ok(()),
    }
}
