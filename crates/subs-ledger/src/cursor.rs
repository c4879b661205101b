//! Collection cursor.
//!
//! Realizes bucketed revenue epoch by epoch:
//!
//! ```text
//! for epoch in next_uncollected..=upto:
//!     running_rate += bucket[epoch].delta
//!     total        += running_rate + bucket[epoch].extra
//! next_uncollected = upto + 1
//! ```
//!
//! Empty epochs contribute exactly `running_rate` each, so the walk only
//! visits stored buckets and accounts for the gaps between them in one
//! multiplication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subs_types::{EpochIndex, SignedAmount, GENESIS_EPOCH};

use crate::bucket::EpochBucket;
use crate::{LedgerError, Result};

/// Monotonic pointer into the epoch buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCursor {
    next_uncollected: EpochIndex,
    running_rate: SignedAmount,
}

impl Default for CollectionCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionCursor {
    /// A cursor at the first epoch with no carried rate.
    pub fn new() -> Self {
        Self {
            next_uncollected: GENESIS_EPOCH,
            running_rate: 0,
        }
    }

    /// The first epoch not yet realized.
    pub fn next_uncollected(&self) -> EpochIndex {
        self.next_uncollected
    }

    /// Per-epoch accrual carried forward from collected epochs.
    pub fn running_rate(&self) -> SignedAmount {
        self.running_rate
    }

    /// Compute the cursor after draining every epoch up to and including
    /// `upto`, together with the realized total. Does not modify `self`.
    ///
    /// If `upto` is below the cursor nothing is drained and the total is zero.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    /// - [`LedgerError::NegativeCollection`] if the buckets reconstruct to a
    ///   negative amount
    pub fn advance(
        &self,
        buckets: &BTreeMap<EpochIndex, EpochBucket>,
        upto: EpochIndex,
    ) -> Result<(CollectionCursor, SignedAmount)> {
        if upto < self.next_uncollected {
            return Ok((*self, 0));
        }

        let mut rate = self.running_rate;
        let mut total: SignedAmount = 0;
        let mut epoch = self.next_uncollected;

        for (&at, bucket) in buckets.range(self.next_uncollected..=upto) {
            total = accrue_gap(total, rate, at - epoch)?;
            rate = rate.checked_add(bucket.delta).ok_or(LedgerError::Overflow)?;
            total = rate
                .checked_add(bucket.extra)
                .and_then(|realized| total.checked_add(realized))
                .ok_or(LedgerError::Overflow)?;
            tracing::trace!(epoch = at, rate, total, "cursor: drained bucket");
            epoch = at + 1;
        }

        if epoch <= upto {
            total = accrue_gap(total, rate, upto - epoch + 1)?;
        }

        if total < 0 {
            return Err(LedgerError::NegativeCollection {
                from: self.next_uncollected,
                upto,
                total,
            });
        }

        let next_uncollected = upto.checked_add(1).ok_or(LedgerError::Overflow)?;
        Ok((
            CollectionCursor {
                next_uncollected,
                running_rate: rate,
            },
            total,
        ))
    }
}

/// Add `epochs` worth of `rate` to `total`.
fn accrue_gap(total: SignedAmount, rate: SignedAmount, epochs: EpochIndex) -> Result<SignedAmount> {
    if epochs == 0 {
        return Ok(total);
    }
    rate.checked_mul(SignedAmount::from(epochs))
        .and_then(|gap| total.checked_add(gap))
        .ok_or(LedgerError::Overflow)
}
