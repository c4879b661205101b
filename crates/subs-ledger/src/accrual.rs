//! Stream accounting: how much of a stream's value is locked (earned by the
//! beneficiary) and how much is unlocked (refundable to the subscriber) at a
//! given time.
//!
//! ```text
//! locked(now)   = rate * clamp(min(now, end) - start, 0, end - start)
//! unlocked(now) = rate * (end - start) - locked(now)
//! ```
//!
//! Both functions are total. Stream values are checked for overflow once,
//! when a stream is admitted (see [`value`]); after that the saturating
//! arithmetic here never actually saturates.

use subs_types::{Amount, PendingStream, Stream, Timestamp};

/// Elapsed portion of `[start, end)` at `now`, clamped to the interval.
fn elapsed(start: Timestamp, end: Timestamp, now: Timestamp) -> u128 {
    let span = duration(start, end);
    let ran = i128::from(now.min(end)) - i128::from(start);
    if ran <= 0 {
        0
    } else {
        (ran as u128).min(span)
    }
}

/// Length of `[start, end)`, zero when the interval is empty or inverted.
fn duration(start: Timestamp, end: Timestamp) -> u128 {
    let span = i128::from(end) - i128::from(start);
    if span <= 0 {
        0
    } else {
        span as u128
    }
}

/// Total value of a stream, `rate * (end - start)`.
///
/// Returns `None` if the product does not fit in an [`Amount`].
pub fn value(start: Timestamp, end: Timestamp, rate: Amount) -> Option<Amount> {
    rate.checked_mul(duration(start, end))
}

/// Value irrevocably owed to the beneficiary at `now`.
pub fn locked(start: Timestamp, end: Timestamp, rate: Amount, now: Timestamp) -> Amount {
    rate.saturating_mul(elapsed(start, end, now))
}

/// Value still refundable to the subscriber at `now`.
pub fn unlocked(start: Timestamp, end: Timestamp, rate: Amount, now: Timestamp) -> Amount {
    let total = rate.saturating_mul(duration(start, end));
    total - locked(start, end, rate, now)
}

/// Accrual helpers for stream records.
pub trait Accrual {
    /// `(start, end, rate)` of the record.
    fn terms(&self) -> (Timestamp, Timestamp, Amount);

    /// Total value, if representable.
    fn value(&self) -> Option<Amount> {
        let (start, end, rate) = self.terms();
        value(start, end, rate)
    }

    /// See [`locked`].
    fn locked(&self, now: Timestamp) -> Amount {
        let (start, end, rate) = self.terms();
        locked(start, end, rate, now)
    }

    /// See [`unlocked`].
    fn unlocked(&self, now: Timestamp) -> Amount {
        let (start, end, rate) = self.terms();
        unlocked(start, end, rate, now)
    }
}

impl Accrual for Stream {
    fn terms(&self) -> (Timestamp, Timestamp, Amount) {
        (self.start, self.end, self.rate)
    }
}

impl Accrual for PendingStream {
    fn terms(&self) -> (Timestamp, Timestamp, Amount) {
        (self.start, self.end, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_locked_before_start() {
        assert_eq!(locked(100, 200, 1, 50), 0);
        assert_eq!(unlocked(100, 200, 1, 50), 100);
    }

    #[test]
    fn test_nothing_locked_at_start_boundary() {
        assert_eq!(locked(100, 200, 3, 100), 0);
        assert_eq!(unlocked(100, 200, 3, 100), 300);
    }

    #[test]
    fn test_progressive_lock() {
        assert_eq!(locked(-5, 200, 1, 0), 5);
        assert_eq!(unlocked(-5, 200, 1, 0), 200);
        assert_eq!(locked(10, 20, 5, 13), 15);
        assert_eq!(unlocked(10, 20, 5, 13), 35);
    }

    #[test]
    fn test_all_locked_at_and_after_end() {
        assert_eq!(locked(10, 20, 5, 20), 50);
        assert_eq!(unlocked(10, 20, 5, 20), 0);
        assert_eq!(locked(10, 20, 5, 1_000_000), 50);
        assert_eq!(unlocked(10, 20, 5, 1_000_000), 0);
    }

    #[test]
    fn test_value_conservation() {
        let (start, end, rate) = (-7, 93, 11u128);
        let total = value(start, end, rate).expect("value");
        for now in -20..120 {
            assert_eq!(locked(start, end, rate, now) + unlocked(start, end, rate, now), total);
        }
    }

    #[test]
    fn test_monotonic_in_now() {
        let (start, end, rate) = (3, 47, 2u128);
        let mut prev_locked = 0;
        let mut prev_unlocked = Amount::MAX;
        for now in -10..60 {
            let l = locked(start, end, rate, now);
            let u = unlocked(start, end, rate, now);
            assert!(l >= prev_locked);
            assert!(u <= prev_unlocked);
            prev_locked = l;
            prev_unlocked = u;
        }
    }

    #[test]
    fn test_value_overflow_detected() {
        assert!(value(0, 2, Amount::MAX).is_none());
        assert_eq!(value(0, 1, Amount::MAX), Some(Amount::MAX));
        assert_eq!(value(5, 5, 9), Some(0));
    }

    #[test]
    fn test_accrual_trait_on_stream() {
        let stream = Stream {
            subscriber: subs_types::Address::from_low_u8(1),
            start: 10,
            end: 15,
            rate: 5,
        };
        assert_eq!(stream.value(), Some(25));
        assert_eq!(stream.locked(12), 10);
        assert_eq!(stream.unlocked(12), 15);
    }
}
