//! Staged bucket patches.
//!
//! A stream `(start, end, rate)` with `es = epoch_of(start)`,
//! `ee = epoch_of(end)` and epoch length `L` projects onto the buckets as:
//!
//! ```text
//! es == ee:  bucket[es].extra += rate * (end - start)
//!
//! es != ee:  bucket[es].delta += rate * L
//!            bucket[es].extra -= rate * (start - L * (es - 1))
//!            bucket[ee].delta -= rate * L
//!            bucket[ee].extra += rate * (end   - L * (ee - 1))
//! ```
//!
//! The projection is linear in `rate`, so removal is the same operation with
//! `-rate`, and any number of streams superimpose in the same buckets.
//!
//! Changes are staged in a [`Projection`] first and applied to the ledger in
//! one step, so an operation that combines several moves (remove then
//! insert, or truncate then insert) either lands completely or not at all.
//! When only the end of a stream moves, the start terms cancel; use
//! [`Projection::retarget_end`] to stage just the end terms.

use std::collections::BTreeMap;

use subs_types::{Amount, EpochIndex, SignedAmount, Timestamp};

use crate::bucket::EpochBucket;
use crate::epoch::EpochMapper;
use crate::{LedgerError, Result};

/// A set of pending bucket changes, keyed by epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    changes: BTreeMap<EpochIndex, EpochBucket>,
}

fn signed_rate(rate: Amount) -> Result<SignedAmount> {
    SignedAmount::try_from(rate).map_err(|_| LedgerError::Overflow)
}

fn mul(a: SignedAmount, b: SignedAmount) -> Result<SignedAmount> {
    a.checked_mul(b).ok_or(LedgerError::Overflow)
}

impl Projection {
    /// An empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the insertion of a stream.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidStream`] if `start >= end` or `rate == 0`
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn insert_stream(
        &mut self,
        mapper: &EpochMapper,
        start: Timestamp,
        end: Timestamp,
        rate: Amount,
    ) -> Result<()> {
        let rate = Self::validate(start, end, rate)?;
        self.stream(mapper, start, end, rate)
    }

    /// Stage the removal of a previously inserted stream.
    ///
    /// # Errors
    ///
    /// Same as [`Projection::insert_stream`].
    pub fn remove_stream(
        &mut self,
        mapper: &EpochMapper,
        start: Timestamp,
        end: Timestamp,
        rate: Amount,
    ) -> Result<()> {
        let rate = Self::validate(start, end, rate)?;
        let neg = rate.checked_neg().ok_or(LedgerError::Overflow)?;
        self.stream(mapper, start, end, neg)
    }

    /// Stage moving the end of a stream from `old_end` to `new_end` at
    /// unchanged `start` and `rate`.
    ///
    /// Equivalent to removing `(start, old_end)` and inserting
    /// `(start, new_end)`, minus the start terms that cancel. This holds for
    /// single-epoch streams too: the single-epoch rule is exactly the start
    /// and end terms summed into one bucket.
    pub fn retarget_end(
        &mut self,
        mapper: &EpochMapper,
        old_end: Timestamp,
        new_end: Timestamp,
        rate: Amount,
    ) -> Result<()> {
        if rate == 0 {
            return Err(LedgerError::InvalidStream {
                start: old_end,
                end: new_end,
                rate: 0,
            });
        }
        let rate = signed_rate(rate)?;
        let neg = rate.checked_neg().ok_or(LedgerError::Overflow)?;
        self.end_terms(mapper, old_end, neg)?;
        self.end_terms(mapper, new_end, rate)
    }

    /// Merge another projection into this one.
    pub fn merge(&mut self, other: &Projection) -> Result<()> {
        for (epoch, change) in &other.changes {
            self.add(*epoch, *change)?;
        }
        Ok(())
    }

    /// Staged change for `epoch` (zero if untouched).
    pub fn get(&self, epoch: EpochIndex) -> EpochBucket {
        self.changes.get(&epoch).copied().unwrap_or_default()
    }

    /// Non-zero staged changes in epoch order.
    pub fn touched(&self) -> impl Iterator<Item = (EpochIndex, EpochBucket)> + '_ {
        self.changes
            .iter()
            .filter(|(_, change)| !change.is_zero())
            .map(|(epoch, change)| (*epoch, *change))
    }

    /// Lowest epoch with a non-zero staged change.
    pub fn first_touched(&self) -> Option<EpochIndex> {
        self.touched().next().map(|(epoch, _)| epoch)
    }

    /// Whether the projection has no net effect.
    pub fn is_empty(&self) -> bool {
        self.touched().next().is_none()
    }

    fn validate(start: Timestamp, end: Timestamp, rate: Amount) -> Result<SignedAmount> {
        let signed = signed_rate(rate)?;
        if start >= end || rate == 0 {
            return Err(LedgerError::InvalidStream {
                start,
                end,
                rate: signed,
            });
        }
        Ok(signed)
    }

    fn stream(
        &mut self,
        mapper: &EpochMapper,
        start: Timestamp,
        end: Timestamp,
        rate: SignedAmount,
    ) -> Result<()> {
        let es = mapper.epoch_of(start);
        let ee = mapper.epoch_of(end);
        if es == ee {
            let span = i128::from(end) - i128::from(start);
            return self.add(
                es,
                EpochBucket {
                    delta: 0,
                    extra: mul(rate, span)?,
                },
            );
        }
        self.start_terms(mapper, start, rate)?;
        self.end_terms(mapper, end, rate)
    }

    fn start_terms(
        &mut self,
        mapper: &EpochMapper,
        start: Timestamp,
        rate: SignedAmount,
    ) -> Result<()> {
        let es = mapper.epoch_of(start);
        let offset = i128::from(start) - mapper.epoch_start(es);
        let full = mul(rate, i128::from(mapper.epoch_length()))?;
        let partial = mul(rate, offset)?;
        self.add(
            es,
            EpochBucket {
                delta: full,
                extra: partial.checked_neg().ok_or(LedgerError::Overflow)?,
            },
        )
    }

    fn end_terms(&mut self, mapper: &EpochMapper, end: Timestamp, rate: SignedAmount) -> Result<()> {
        let ee = mapper.epoch_of(end);
        let offset = i128::from(end) - mapper.epoch_start(ee);
        let full = mul(rate, i128::from(mapper.epoch_length()))?;
        let partial = mul(rate, offset)?;
        self.add(
            ee,
            EpochBucket {
                delta: full.checked_neg().ok_or(LedgerError::Overflow)?,
                extra: partial,
            },
        )
    }

    fn add(&mut self, epoch: EpochIndex, change: EpochBucket) -> Result<()> {
        let slot = self.changes.entry(epoch).or_default();
        *slot = slot.checked_add(&change)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> EpochMapper {
        EpochMapper::new(100).expect("mapper")
    }

    #[test]
    fn test_single_epoch_touches_only_extra() {
        let mut p = Projection::new();
        p.insert_stream(&mapper(), 10, 15, 5).expect("insert");
        assert_eq!(p.get(1), EpochBucket { delta: 0, extra: 25 });
        assert_eq!(p.touched().count(), 1);
    }

    #[test]
    fn test_multi_epoch_touches_start_and_end() {
        let mut p = Projection::new();
        p.insert_stream(&mapper(), 130, 450, 2).expect("insert");
        assert_eq!(
            p.get(2),
            EpochBucket {
                delta: 200,
                extra: -60,
            }
        );
        assert_eq!(
            p.get(5),
            EpochBucket {
                delta: -200,
                extra: 100,
            }
        );
        assert_eq!(p.touched().count(), 2);
    }

    #[test]
    fn test_pre_origin_start() {
        let mut p = Projection::new();
        p.insert_stream(&mapper(), -5, 205, 1).expect("insert");
        assert_eq!(p.get(1), EpochBucket { delta: 100, extra: 5 });
        assert_eq!(p.get(3), EpochBucket { delta: -100, extra: 5 });
    }

    #[test]
    fn test_insert_then_remove_cancels() {
        let m = mapper();
        let mut p = Projection::new();
        p.insert_stream(&m, 37, 912, 7).expect("insert");
        p.remove_stream(&m, 37, 912, 7).expect("remove");
        assert!(p.is_empty());
        assert_eq!(p.first_touched(), None);
    }

    #[test]
    fn test_retarget_matches_remove_insert() {
        let m = mapper();
        let mut full = Projection::new();
        full.remove_stream(&m, 40, 730, 3).expect("remove");
        full.insert_stream(&m, 40, 310, 3).expect("insert");

        let mut tail = Projection::new();
        tail.retarget_end(&m, 730, 310, 3).expect("retarget");

        assert_eq!(full.touched().collect::<Vec<_>>(), tail.touched().collect::<Vec<_>>());
        assert_eq!(tail.first_touched(), Some(4));
    }

    #[test]
    fn test_invalid_streams_rejected() {
        let m = mapper();
        let mut p = Projection::new();
        assert!(matches!(
            p.insert_stream(&m, 20, 20, 1),
            Err(LedgerError::InvalidStream { .. })
        ));
        assert!(matches!(
            p.insert_stream(&m, 30, 20, 1),
            Err(LedgerError::InvalidStream { .. })
        ));
        assert!(matches!(
            p.insert_stream(&m, 0, 20, 0),
            Err(LedgerError::InvalidStream { .. })
        ));
        assert_eq!(
            p.insert_stream(&m, 0, 20, Amount::MAX),
            Err(LedgerError::Overflow)
        );
        assert!(p.is_empty());
    }

    #[test]
    fn test_merge_is_additive() {
        let m = mapper();
        let mut a = Projection::new();
        a.insert_stream(&m, 0, 250, 1).expect("a");
        let mut b = Projection::new();
        b.insert_stream(&m, 120, 250, 4).expect("b");
        a.merge(&b).expect("merge");
        assert_eq!(
            a.get(3),
            EpochBucket {
                delta: -500,
                extra: 250,
            }
        );
    }
}
