//! Per-connection sequence numbering.
//!
//! # What is a sequence number? (for beginners)
//!
//! Requests are fire-and-forget frames; the server answers later, and answers
//! may arrive in any order. Every request carries a sequence number and the
//! server copies it into its response, which is how a response finds the
//! caller that is waiting for it.
//!
//! # Numbering rules
//!
//! - A fresh connection hands out `1` first.
//! - After the transport drops, the counter resets to `0`; the first request on
//!   the new transport is numbered `0`.
//! - Numbers never move backwards within one transport generation, and a
//!   number still waiting for its response is never handed out again. When the
//!   `u32` space wraps, outstanding numbers are skipped.
//!
//! The counter is owned by a connection's state and always mutated under that
//! connection's lock, so it needs no atomics.

use crate::protocol::messages::Seq;

/// Monotonic `u32` sequence allocator.
///
/// # Examples
///
/// ```rust
/// use switchlink_core::protocol::SequenceCounter;
///
/// let mut counter = SequenceCounter::new();
/// assert_eq!(counter.allocate(|_| false), 1);
/// assert_eq!(counter.allocate(|_| false), 2);
/// counter.reset();
/// assert_eq!(counter.allocate(|_| false), 0);
/// ```
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: Seq,
}

impl SequenceCounter {
    /// Creates a counter for a brand-new connection, starting at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Hands out the next number, skipping any for which `in_use` is true.
    ///
    /// Every call consumes at least one number, including for requests that
    /// later fail.
    pub fn allocate(&mut self, in_use: impl Fn(Seq) -> bool) -> Seq {
        loop {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1);
            if !in_use(candidate) {
                return candidate;
            }
        }
    }

    /// The number the next [`allocate`](Self::allocate) call will try first.
    pub fn peek(&self) -> Seq {
        self.next
    }

    /// Restarts numbering for a new transport generation.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
