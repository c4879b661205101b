//! Lifecycle events.
//!
//! Emitted by the subscription engine after an operation has fully applied.
//! The payload layout is consumed by external indexers, so field names are
//! part of the compatibility surface.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, EpochIndex, Timestamp};

/// All events produced by the subscription engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum LedgerEvent {
    /// A stream was created or replaced. `epoch` is the epoch of the
    /// effective (possibly clamped) start.
    Subscribed {
        subscriber: Address,
        epoch: EpochIndex,
        start: Timestamp,
        end: Timestamp,
        rate: Amount,
    },
    /// A stream was cancelled. `epoch` is the epoch of the cancellation time.
    Unsubscribed {
        subscriber: Address,
        epoch: EpochIndex,
    },
    /// A stream's end was pushed later.
    Extended {
        subscriber: Address,
        old_end: Timestamp,
        new_end: Timestamp,
        amount_added: Amount,
    },
    /// A stream offer was recorded (or overwritten) for `owner`.
    PendingSubscriptionCreated {
        owner: Address,
        epoch: EpochIndex,
        start: Timestamp,
        end: Timestamp,
        rate: Amount,
    },
    AuthorizedSignerAdded {
        owner: Address,
        signer: Address,
    },
    AuthorizedSignerRemoved {
        owner: Address,
        signer: Address,
    },
    /// The privileged `create` caller changed.
    RecurringPaymentsUpdated {
        recurring_payments: Address,
    },
    /// Bucketed revenue was realized for the beneficiary.
    Collected {
        upto_epoch: EpochIndex,
        amount: Amount,
    },
}

impl LedgerEvent {
    /// Stable event name, as used in indexer schemas and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Subscribed { .. } => "Subscribed",
            LedgerEvent::Unsubscribed { .. } => "Unsubscribed",
            LedgerEvent::Extended { .. } => "Extended",
            LedgerEvent::PendingSubscriptionCreated { .. } => "PendingSubscriptionCreated",
            LedgerEvent::AuthorizedSignerAdded { .. } => "AuthorizedSignerAdded",
            LedgerEvent::AuthorizedSignerRemoved { .. } => "AuthorizedSignerRemoved",
            LedgerEvent::RecurringPaymentsUpdated { .. } => "RecurringPaymentsUpdated",
            LedgerEvent::Collected { .. } => "Collected",
        }
    }
}
