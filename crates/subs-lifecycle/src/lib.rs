//! # subs-lifecycle
//!
//! Subscription lifecycle on top of the epoch ledger.
//!
//! The [`Subscriptions`] engine owns the per-subscriber stream records and
//! the ledger, and drives every ledger mutation from a lifecycle operation
//! (subscribe, extend, add-to, unsubscribe, pending fulfilment, privileged
//! create) or from a collection. Value custody, access control and time are
//! external collaborators behind the traits in [`ports`].
//!
//! ## Modules
//!
//! - [`engine`]: The lifecycle state machine
//! - [`store`]: Current and pending stream records
//! - [`ports`]: Collaborator interfaces
//! - [`vault`]: In-memory value-transfer collaborator
//! - [`clock`]: Manual and system clocks
//! - [`signers`]: Authorized signer registry
//! - [`params`]: Privileged `create` payload codec
//! - [`classify`]: Upgrade / downgrade / renewal classification

pub mod classify;
pub mod clock;
pub mod engine;
pub mod params;
pub mod ports;
pub mod signers;
pub mod store;
pub mod vault;

pub use classify::ChangeKind;
pub use clock::{ManualClock, SystemClock};
pub use engine::{EngineSnapshot, Payout, Receipt, Subscriptions, SubscriptionsConfig};
pub use params::CreateParams;
pub use ports::{Authorizer, Clock, TransferError, ValueTransfer};
pub use signers::SignerRegistry;
pub use store::SubscriptionStore;
pub use vault::Vault;

use subs_ledger::LedgerError;
use subs_types::Amount;

/// Error types for lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The party is the null identity or the ledger itself, or an
    /// operation names a party it may not.
    #[error("invalid party: {0}")]
    InvalidParty(String),

    /// A time range, time value, or amount is out of bounds.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// The subscriber's current state does not allow the operation.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Funding or escrow approval does not cover the required value.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount the operation needs.
        required: Amount,
        /// Amount that was offered or approved.
        available: Amount,
    },

    /// The caller may not act for the named party.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The privileged `create` payload could not be decoded.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Arithmetic overflow in a value computation.
    #[error("arithmetic overflow in subscription value calculation")]
    Overflow,

    /// The value-transfer collaborator failed for a reason other than
    /// missing funds.
    #[error("value transfer failed: {0}")]
    Transfer(TransferError),

    /// The ledger rejected a bucket change.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<TransferError> for SubscriptionError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InsufficientBalance {
                required,
                available,
            }
            | TransferError::InsufficientAllowance {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            other => Self::Transfer(other),
        }
    }
}

/// Convenience result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
