//! # subs-types
//!
//! Shared domain types used across the subscriptions workspace: party
//! identities, the time and amount domains of the epoch ledger, stream
//! records, and the lifecycle events consumed by external indexers.

pub mod address;
pub mod events;
pub mod stream;

pub use address::{Address, AddressParseError};
pub use events::LedgerEvent;
pub use stream::{PendingStream, Stream};

/// Absolute time in abstract ledger units (seconds or blocks).
///
/// Signed so that pre-origin values can be expressed; lifecycle inputs are
/// validated into the non-negative range before they reach the ledger.
pub type Timestamp = i64;

/// Unsigned token amount.
pub type Amount = u128;

/// Signed token amount, used by epoch buckets and the collection cursor.
pub type SignedAmount = i128;

/// 1-based epoch index. Epoch 1 covers `[0, epoch_length)`.
pub type EpochIndex = u64;

/// Index of the first epoch.
pub const GENESIS_EPOCH: EpochIndex = 1;

/// Length of a party identity in bytes.
pub const ADDRESS_LEN: usize = 20;
