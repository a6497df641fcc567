//! Table of requests waiting for their response.
//!
//! Each entry is keyed by the request's sequence number and holds a one-shot
//! reply channel. Every entry leaves the table exactly once, through one of:
//!
//! - [`resolve`](PendingTable::resolve): a matching response arrived,
//! - [`forget`](PendingTable::forget): the caller gave up (timeout, cancel),
//! - [`fail_all`](PendingTable::fail_all): the transport dropped or the
//!   connection was removed.
//!
//! Sequence numbers restart after a reconnect, so a number alone does not
//! identify a request across generations. Entries therefore also carry a
//! [`Ticket`], and `forget` only removes the entry whose ticket matches.

use std::collections::HashMap;

use switchlink_core::{AppResponse, Seq};
use tokio::sync::oneshot;

use crate::application::error::MuxError;

pub type ResponseResult = Result<AppResponse, MuxError>;

/// Unique identity of one pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

struct PendingEntry {
    ticket: Ticket,
    reply: oneshot::Sender<ResponseResult>,
}

#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<Seq, PendingEntry>,
    next_ticket: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `seq`.
    ///
    /// The caller must have allocated `seq` so that it is not already pending.
    pub fn insert(&mut self, seq: Seq) -> (Ticket, oneshot::Receiver<ResponseResult>) {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let (reply, rx) = oneshot::channel();
        let previous = self.entries.insert(seq, PendingEntry { ticket, reply });
        debug_assert!(previous.is_none(), "sequence {seq} allocated twice");
        (ticket, rx)
    }

    pub fn contains(&self, seq: Seq) -> bool {
        self.entries.contains_key(&seq)
    }

    /// Hands `response` to the request waiting on its sequence number.
    ///
    /// Returns `false` if nothing was waiting, which happens for late
    /// responses to requests that already timed out or were cancelled.
    pub fn resolve(&mut self, response: AppResponse) -> bool {
        match self.entries.remove(&response.seq) {
            Some(entry) => {
                // The waiter may have been dropped in the meantime.
                let _ = entry.reply.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `seq` if it still belongs to `ticket`.
    pub fn forget(&mut self, seq: Seq, ticket: Ticket) -> bool {
        match self.entries.get(&seq) {
            Some(entry) if entry.ticket == ticket => {
                self.entries.remove(&seq);
                true
            }
            _ => false,
        }
    }

    /// Fails and removes every entry. Returns how many were failed.
    pub fn fail_all(&mut self, error: &MuxError) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            let _ = entry.reply.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
