//! Collaborator interfaces consumed by the engine.
//!
//! The engine is generic over these traits and never reaches past them, so a
//! host can swap the in-memory implementations for real custody, clocks, or
//! access control.

use subs_types::{Address, Amount, Timestamp};

/// Failure reported by a [`ValueTransfer`] collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The payer holds less than the amount.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount requested.
        required: Amount,
        /// Payer balance.
        available: Amount,
    },

    /// The payer approved less than the amount.
    #[error("insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance {
        /// Amount requested.
        required: Amount,
        /// Remaining approval.
        available: Amount,
    },

    /// Escrow holds less than a requested payout.
    #[error("insufficient escrow: required {required}, available {available}")]
    InsufficientEscrow {
        /// Amount requested.
        required: Amount,
        /// Escrowed value.
        available: Amount,
    },

    /// A balance would overflow.
    #[error("arithmetic overflow in value transfer")]
    Overflow,
}

/// Custody of escrowed value.
pub trait ValueTransfer {
    /// Pull `amount` from `from` into escrow.
    fn escrow_in(&mut self, from: Address, amount: Amount) -> Result<(), TransferError>;

    /// Pay `amount` out of escrow to `to`.
    fn escrow_out(&mut self, to: Address, amount: Amount) -> Result<(), TransferError>;

    /// Undo a completed [`ValueTransfer::escrow_in`]: return `amount` to
    /// `from` and restore the approval it consumed.
    fn revert_escrow_in(&mut self, from: Address, amount: Amount) -> Result<(), TransferError>;

    /// Undo a completed [`ValueTransfer::escrow_out`]: move `amount` from
    /// `to` back into escrow without touching any approval.
    fn revert_escrow_out(&mut self, to: Address, amount: Amount) -> Result<(), TransferError>;
}

/// Monotonically non-decreasing time source.
pub trait Clock {
    /// Current time in ledger units.
    fn now(&self) -> Timestamp;
}

/// Access-control check for acting on behalf of another party.
pub trait Authorizer {
    /// Whether `caller` may act for `owner`. Always true when
    /// `caller == owner`.
    fn is_authorized(&self, owner: Address, caller: Address) -> bool;
}
