//! # subs-ledger
//!
//! Epoch-indexed streaming ledger.
//!
//! Every subscription is a constant-rate stream over `[start, end)`. Instead
//! of summing over streams when revenue is realized, each stream is projected
//! once onto a sparse map of epoch buckets holding a `(delta, extra)` pair. A
//! monotonic cursor later walks the buckets with a running rate, so the cost
//! of collection grows with elapsed epochs and not with the number of
//! streams.
//!
//! ## Modules
//!
//! - [`epoch`]: Time to epoch mapping
//! - [`accrual`]: Locked / unlocked value of a single stream
//! - [`bucket`]: The `(delta, extra)` bucket
//! - [`projection`]: Staged bucket patches for inserting, removing and
//!   retargeting streams
//! - [`cursor`]: Collection cursor
//! - [`ledger`]: The ledger itself

pub mod accrual;
pub mod bucket;
pub mod cursor;
pub mod epoch;
pub mod ledger;
pub mod projection;

pub use bucket::EpochBucket;
pub use cursor::CollectionCursor;
pub use epoch::EpochMapper;
pub use ledger::{Ledger, LedgerPatch};
pub use projection::Projection;

use subs_types::{EpochIndex, Timestamp};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Arithmetic overflow in bucket or collection math.
    #[error("arithmetic overflow in ledger calculation")]
    Overflow,

    /// Epoch length must be strictly positive.
    #[error("epoch length must be positive, got {0}")]
    InvalidEpochLength(Timestamp),

    /// Stream parameters cannot be projected.
    #[error("invalid stream: start {start}, end {end}, rate {rate}")]
    InvalidStream {
        /// Stream start.
        start: Timestamp,
        /// Stream end.
        end: Timestamp,
        /// Stream rate.
        rate: i128,
    },

    /// A non-zero bucket change targets an epoch the cursor has passed.
    #[error("epoch {epoch} already collected (next uncollected epoch is {next_uncollected})")]
    EpochAlreadyCollected {
        /// The epoch that would have been touched.
        epoch: EpochIndex,
        /// The cursor position.
        next_uncollected: EpochIndex,
    },

    /// Reconstructed revenue came out negative. Indicates corrupted buckets.
    #[error("collection over epochs {from}..={upto} produced a negative total {total}")]
    NegativeCollection {
        /// First epoch drained.
        from: EpochIndex,
        /// Last epoch drained.
        upto: EpochIndex,
        /// The offending total.
        total: i128,
    },
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
