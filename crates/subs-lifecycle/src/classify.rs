//! Classification of stream transitions for indexers.
//!
//! Purely observational: the ledger never reads it.

use serde::{Deserialize, Serialize};
use subs_types::{Stream, Timestamp};

/// Kind of change an operation made to a subscriber's stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// First stream for the subscriber.
    Created,
    /// Replaced a live stream with a higher rate.
    Upgrade,
    /// Replaced a live stream with a lower rate.
    Downgrade,
    /// Same rate, an extension, or a new stream after cancellation or
    /// expiry.
    Renewal,
    /// Stream cancelled.
    Canceled,
}

/// Classify replacing `prev` with `next` at `now`.
pub fn classify(prev: Option<&Stream>, next: &Stream, now: Timestamp) -> ChangeKind {
    match prev {
        None => ChangeKind::Created,
        Some(prev) if prev.is_expired(now) => ChangeKind::Renewal,
        Some(prev) if next.rate > prev.rate => ChangeKind::Upgrade,
        Some(prev) if next.rate < prev.rate => ChangeKind::Downgrade,
        Some(_) => ChangeKind::Renewal,
    }
}
