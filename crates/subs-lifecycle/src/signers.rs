//! Authorized signer registry.
//!
//! An owner may let other parties act on their behalf. The owner is always
//! implicitly authorized for themselves, so adding or removing the owner is
//! rejected.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use subs_types::Address;

use crate::ports::Authorizer;
use crate::{Result, SubscriptionError};

/// `owner -> {signer}` relation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRegistry {
    signers: BTreeMap<Address, BTreeSet<Address>>,
}

impl SignerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `signer` act for `owner`. Returns `false` if it already could.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidParty`] if `signer` is zero or is
    ///   `owner` itself
    pub fn add(&mut self, owner: Address, signer: Address) -> Result<bool> {
        Self::check_signer(owner, signer)?;
        Ok(self.signers.entry(owner).or_default().insert(signer))
    }

    /// Revoke `signer` for `owner`. Returns `false` if it was not
    /// authorized.
    ///
    /// # Errors
    ///
    /// Same as [`SignerRegistry::add`].
    pub fn remove(&mut self, owner: Address, signer: Address) -> Result<bool> {
        Self::check_signer(owner, signer)?;
        let Some(set) = self.signers.get_mut(&owner) else {
            return Ok(false);
        };
        let removed = set.remove(&signer);
        if set.is_empty() {
            self.signers.remove(&owner);
        }
        Ok(removed)
    }

    /// Explicit signers of `owner` (the owner itself is not listed).
    pub fn signers_of(&self, owner: &Address) -> impl Iterator<Item = &Address> + '_ {
        self.signers.get(owner).into_iter().flatten()
    }

    fn check_signer(owner: Address, signer: Address) -> Result<()> {
        if signer == owner {
            return Err(SubscriptionError::InvalidParty(
                "user is always an authorized signer".to_string(),
            ));
        }
        if signer.is_zero() {
            return Err(SubscriptionError::InvalidParty(
                "signer cannot be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

impl Authorizer for SignerRegistry {
    fn is_authorized(&self, owner: Address, caller: Address) -> bool {
        caller == owner
            || self
                .signers
                .get(&owner)
                .is_some_and(|set| set.contains(&caller))
    }
}
