//! The per-epoch `(delta, extra)` bucket.
//!
//! `delta` is a rate contribution that applies to this epoch and every later
//! one until cancelled by an opposite `delta`; `extra` is a one-off correction
//! for the partial first or last epoch of a stream.

use serde::{Deserialize, Serialize};
use subs_types::SignedAmount;

use crate::{LedgerError, Result};

/// A single epoch bucket. An all-zero bucket is logically absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochBucket {
    /// Change to the running per-epoch rate, effective from this epoch.
    pub delta: SignedAmount,
    /// One-off amount realized in this epoch only.
    pub extra: SignedAmount,
}

impl EpochBucket {
    /// The zero bucket.
    pub const ZERO: EpochBucket = EpochBucket { delta: 0, extra: 0 };

    /// Whether both fields are zero.
    pub fn is_zero(&self) -> bool {
        self.delta == 0 && self.extra == 0
    }

    /// Field-wise checked addition.
    pub fn checked_add(&self, other: &EpochBucket) -> Result<EpochBucket> {
        Ok(EpochBucket {
            delta: self
                .delta
                .checked_add(other.delta)
                .ok_or(LedgerError::Overflow)?,
            extra: self
                .extra
                .checked_add(other.extra)
                .ok_or(LedgerError::Overflow)?,
        })
    }

    /// Field-wise checked negation.
    pub fn checked_neg(&self) -> Result<EpochBucket> {
        Ok(EpochBucket {
            delta: self.delta.checked_neg().ok_or(LedgerError::Overflow)?,
            extra: self.extra.checked_neg().ok_or(LedgerError::Overflow)?,
        })
    }
}
