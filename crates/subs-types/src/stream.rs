//! Stream records.
//!
//! A stream is a constant-rate payment obligation over `[start, end)`. The
//! total value it escrows is `rate * (end - start)`.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Timestamp};

/// The current (funded) stream of a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct Stream {
    /// Identity the stream belongs to.
    pub subscriber: Address,
    /// First time unit of the stream (inclusive).
    pub start: Timestamp,
    /// End of the stream (exclusive).
    pub end: Timestamp,
    /// Value accrued per time unit.
    pub rate: Amount,
}

/// An unfunded stream offer, waiting for a third party to fulfil it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct PendingStream {
    /// Identity the stream will belong to once fulfilled.
    pub owner: Address,
    pub start: Timestamp,
    pub end: Timestamp,
    pub rate: Amount,
}

impl Stream {
    /// Whether the stream has reached its end at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end <= now
    }

    /// Whether the stream has started and not yet ended at `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.start <= now && now < self.end
    }

    /// Whether the stream begins strictly after `now`.
    pub fn is_upcoming(&self, now: Timestamp) -> bool {
        now < self.start
    }
}
