//! Party identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::ADDRESS_LEN;

/// A 20-byte party identity (subscriber, signer, beneficiary, or the ledger
/// itself). Serialized as lowercase hex.
#[serde_as]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ts_rs::TS,
)]
#[serde(transparent)]
pub struct Address(
    #[serde_as(as = "Hex")]
    #[ts(type = "string")]
    pub [u8; ADDRESS_LEN],
);

/// Error parsing an [`Address`] from text.
#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Decoded to the wrong number of bytes.
    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
}

impl Address {
    /// The null identity. Never a valid subscriber.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Build an address whose last byte is `n`. Handy for fixtures and
    /// configuration examples.
    pub const fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 1] = n;
        Address(bytes)
    }

    /// Whether this is the null identity.
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        let array: [u8; ADDRESS_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::Length(bytes.len()))?;
        Ok(Address(array))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}
