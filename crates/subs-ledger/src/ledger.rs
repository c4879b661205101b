//! The epoch ledger: sparse buckets plus the collection cursor.
//!
//! The ledger is only ever mutated through stream projections
//! ([`Ledger::insert_stream`], [`Ledger::remove_stream`],
//! [`Ledger::retarget_end`], or a staged [`Projection`] via
//! [`Ledger::apply`]) and through [`Ledger::collect`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subs_types::{Amount, EpochIndex, Timestamp};

use crate::bucket::EpochBucket;
use crate::cursor::CollectionCursor;
use crate::epoch::EpochMapper;
use crate::projection::Projection;
use crate::{LedgerError, Result};

/// Bucket values computed by [`Ledger::stage`], ready to be committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use = "a staged patch does nothing until committed"]
pub struct LedgerPatch {
    writes: Vec<(EpochIndex, EpochBucket)>,
}

impl LedgerPatch {
    /// Whether committing the patch would write nothing.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Epoch-indexed streaming ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    mapper: EpochMapper,
    buckets: BTreeMap<EpochIndex, EpochBucket>,
    cursor: CollectionCursor,
}

impl Ledger {
    /// Create an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidEpochLength`] if `epoch_length <= 0`
    pub fn new(epoch_length: Timestamp) -> Result<Self> {
        Ok(Self {
            mapper: EpochMapper::new(epoch_length)?,
            buckets: BTreeMap::new(),
            cursor: CollectionCursor::new(),
        })
    }

    /// The epoch mapping of this ledger.
    pub fn mapper(&self) -> &EpochMapper {
        &self.mapper
    }

    /// Epoch containing `t`.
    pub fn epoch_of(&self, t: Timestamp) -> EpochIndex {
        self.mapper.epoch_of(t)
    }

    /// Logical bucket at `epoch` (zero when absent).
    pub fn bucket(&self, epoch: EpochIndex) -> EpochBucket {
        self.buckets.get(&epoch).copied().unwrap_or_default()
    }

    /// Number of physically stored buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Current collection cursor.
    pub fn cursor(&self) -> &CollectionCursor {
        &self.cursor
    }

    /// Project a stream's contribution into the buckets.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidStream`] if `start >= end` or `rate == 0`
    /// - [`LedgerError::EpochAlreadyCollected`] if a touched epoch has been
    ///   collected
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn insert_stream(&mut self, start: Timestamp, end: Timestamp, rate: Amount) -> Result<()> {
        let mut projection = Projection::new();
        projection.insert_stream(&self.mapper, start, end, rate)?;
        self.apply(&projection)
    }

    /// Remove a previously inserted stream's contribution.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::insert_stream`].
    pub fn remove_stream(&mut self, start: Timestamp, end: Timestamp, rate: Amount) -> Result<()> {
        let mut projection = Projection::new();
        projection.remove_stream(&self.mapper, start, end, rate)?;
        self.apply(&projection)
    }

    /// Move the end of an inserted stream, leaving its start terms alone.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::insert_stream`].
    pub fn retarget_end(&mut self, old_end: Timestamp, new_end: Timestamp, rate: Amount) -> Result<()> {
        let mut projection = Projection::new();
        projection.retarget_end(&self.mapper, old_end, new_end, rate)?;
        self.apply(&projection)
    }

    /// Apply a staged projection atomically.
    ///
    /// Every touched bucket is checked first; nothing is written unless all
    /// changes can be applied.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::stage`].
    pub fn apply(&mut self, projection: &Projection) -> Result<()> {
        let patch = self.stage(projection)?;
        self.commit(patch);
        Ok(())
    }

    /// Validate a projection against the current buckets and compute the
    /// resulting bucket values without writing them.
    ///
    /// The returned patch must be committed before the ledger is mutated in
    /// any other way.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EpochAlreadyCollected`] if a non-zero change targets
    ///   an epoch below the cursor
    /// - [`LedgerError::Overflow`] if a bucket would overflow
    pub fn stage(&self, projection: &Projection) -> Result<LedgerPatch> {
        let next_uncollected = self.cursor.next_uncollected();
        let mut writes = Vec::new();
        for (epoch, change) in projection.touched() {
            if epoch < next_uncollected {
                return Err(LedgerError::EpochAlreadyCollected {
                    epoch,
                    next_uncollected,
                });
            }
            writes.push((epoch, self.bucket(epoch).checked_add(&change)?));
        }
        Ok(LedgerPatch { writes })
    }

    /// Write a patch produced by [`Ledger::stage`].
    pub fn commit(&mut self, patch: LedgerPatch) {
        for (epoch, bucket) in patch.writes {
            tracing::debug!(
                epoch,
                delta = bucket.delta,
                extra = bucket.extra,
                "ledger: bucket updated"
            );
            self.buckets.insert(epoch, bucket);
        }
    }

    /// Realize every epoch up to and including `upto` and advance the cursor.
    ///
    /// Returns `0` without moving the cursor when `upto` is below it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    /// - [`LedgerError::NegativeCollection`] if the buckets are inconsistent
    pub fn collect(&mut self, upto: EpochIndex) -> Result<Amount> {
        let from = self.cursor.next_uncollected();
        let (cursor, total) = self.cursor.advance(&self.buckets, upto)?;
        self.cursor = cursor;
        if upto >= from {
            tracing::info!(
                from,
                upto,
                total,
                running_rate = cursor.running_rate(),
                "ledger: collected epochs"
            );
        }
        Amount::try_from(total).map_err(|_| LedgerError::Overflow)
    }

    /// What [`Ledger::collect`] would return for `upto`, without moving the
    /// cursor.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::collect`].
    pub fn collectable_through(&self, upto: EpochIndex) -> Result<Amount> {
        let (_, total) = self.cursor.advance(&self.buckets, upto)?;
        Amount::try_from(total).map_err(|_| LedgerError::Overflow)
    }

    /// Drop all-zero buckets the cursor has already passed. Returns the
    /// number of buckets removed.
    pub fn prune_collected(&mut self) -> usize {
        let next_uncollected = self.cursor.next_uncollected();
        let before = self.buckets.len();
        self.buckets
            .retain(|epoch, bucket| *epoch >= next_uncollected || !bucket.is_zero());
        let pruned = before - self.buckets.len();
        if pruned > 0 {
            tracing::debug!(pruned, next_uncollected, "ledger: pruned collected buckets");
        }
        pruned
    }
}
