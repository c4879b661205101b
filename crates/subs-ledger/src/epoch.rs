//! Time to epoch mapping.
//!
//! `epoch_of(t) = floor(t / epoch_length) + 1`, so epoch 1 covers
//! `[0, epoch_length)` and epoch `n` covers
//! `[(n - 1) * epoch_length, n * epoch_length)`.
//!
//! Times before the origin map to epoch 1. The bucket math still uses the
//! raw time, so the pre-origin part of a stream is accounted in the first
//! epoch rather than dropped.

use serde::{Deserialize, Serialize};
use subs_types::{EpochIndex, Timestamp, GENESIS_EPOCH};

use crate::{LedgerError, Result};

/// Map an absolute time to its 1-based epoch index.
///
/// `epoch_length` must be positive; callers go through [`EpochMapper`],
/// which enforces that at construction.
pub fn epoch_of(t: Timestamp, epoch_length: Timestamp) -> EpochIndex {
    // Non-negative quotients fit u64 with room for the +1.
    match EpochIndex::try_from(t.div_euclid(epoch_length)) {
        Ok(floor) => floor + 1,
        Err(_) => GENESIS_EPOCH,
    }
}

/// Fixed-length epoch mapping. Immutable after construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochMapper {
    epoch_length: Timestamp,
}

impl EpochMapper {
    /// Create a mapper with the given epoch length.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidEpochLength`] if `epoch_length <= 0`
    pub fn new(epoch_length: Timestamp) -> Result<Self> {
        if epoch_length <= 0 {
            return Err(LedgerError::InvalidEpochLength(epoch_length));
        }
        Ok(Self { epoch_length })
    }

    /// The epoch length in time units.
    pub fn epoch_length(&self) -> Timestamp {
        self.epoch_length
    }

    /// Epoch containing `t`.
    pub fn epoch_of(&self, t: Timestamp) -> EpochIndex {
        epoch_of(t, self.epoch_length)
    }

    /// First time unit of `epoch`, as a wide integer so that bucket math on
    /// far-future epochs cannot overflow.
    pub fn epoch_start(&self, epoch: EpochIndex) -> i128 {
        i128::from(self.epoch_length) * (i128::from(epoch) - 1)
    }

    /// Exclusive end of `epoch` (the start of the next one).
    pub fn epoch_end(&self, epoch: EpochIndex) -> i128 {
        i128::from(self.epoch_length) * i128::from(epoch)
    }
}
