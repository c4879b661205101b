//! In-memory value-transfer collaborator.
//!
//! Tracks per-account balances and the allowance each account has granted
//! the ledger. Escrowed value is pooled; payouts draw from the pool.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use subs_types::{Address, Amount};

use crate::ports::{TransferError, ValueTransfer};

/// Balances, allowances, and the escrow pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<Address, Amount>,
    escrowed: Amount,
}

impl Vault {
    /// An empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `account` from outside the system.
    pub fn deposit(&mut self, account: Address, amount: Amount) -> Result<(), TransferError> {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }

    /// Set the amount `account` lets the ledger pull. Replaces any previous
    /// approval.
    pub fn approve(&mut self, account: Address, amount: Amount) {
        self.allowances.insert(account, amount);
    }

    /// Balance held by `account`.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Remaining approval granted by `account`.
    pub fn allowance(&self, account: &Address) -> Amount {
        self.allowances.get(account).copied().unwrap_or(0)
    }

    /// Total value currently held in escrow.
    pub fn escrowed(&self) -> Amount {
        self.escrowed
    }
}

impl ValueTransfer for Vault {
    fn escrow_in(&mut self, from: Address, amount: Amount) -> Result<(), TransferError> {
        let allowance = self.allowance(&from);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                required: amount,
                available: allowance,
            });
        }
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        let escrowed = self
            .escrowed
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.allowances.insert(from, allowance - amount);
        self.balances.insert(from, balance - amount);
        self.escrowed = escrowed;
        tracing::trace!(%from, amount, "vault: escrow in");
        Ok(())
    }

    fn escrow_out(&mut self, to: Address, amount: Amount) -> Result<(), TransferError> {
        if self.escrowed < amount {
            return Err(TransferError::InsufficientEscrow {
                required: amount,
                available: self.escrowed,
            });
        }
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.escrowed -= amount;
        self.balances.insert(to, balance);
        tracing::trace!(%to, amount, "vault: escrow out");
        Ok(())
    }

    fn revert_escrow_in(&mut self, from: Address, amount: Amount) -> Result<(), TransferError> {
        if self.escrowed < amount {
            return Err(TransferError::InsufficientEscrow {
                required: amount,
                available: self.escrowed,
            });
        }
        let balance = self
            .balance_of(&from)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        let allowance = self
            .allowance(&from)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.escrowed -= amount;
        self.balances.insert(from, balance);
        self.allowances.insert(from, allowance);
        tracing::trace!(%from, amount, "vault: escrow in reverted");
        Ok(())
    }

    fn revert_escrow_out(&mut self, to: Address, amount: Amount) -> Result<(), TransferError> {
        let balance = self.balance_of(&to);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        let escrowed = self
            .escrowed
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.balances.insert(to, balance - amount);
        self.escrowed = escrowed;
        tracing::trace!(%to, amount, "vault: escrow out reverted");
        Ok(())
    }
}
