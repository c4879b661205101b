//! CBOR codec for the privileged `create` payload.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use subs_types::Amount;

use crate::{Result, SubscriptionError};

/// Stream parameters submitted by the recurring-payments collaborator.
///
/// Times are unsigned on the wire; the engine rejects values its signed
/// time domain cannot hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateParams {
    /// Requested start.
    pub start: u64,
    /// Requested end.
    pub end: u64,
    /// Value per time unit.
    pub rate: Amount,
}

impl CreateParams {
    /// Encode as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidParams`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        to_vec(self)
    }

    /// Decode from CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidParams`] if the bytes are not a
    /// valid payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        from_slice(data)
    }
}

/// Serialize a value to CBOR bytes.
pub(crate) fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| {
        SubscriptionError::InvalidParams(format!("CBOR serialization failed: {e}"))
    })?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub(crate) fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| {
        SubscriptionError::InvalidParams(format!("CBOR deserialization failed: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_params_roundtrip() {
        let params = CreateParams {
            start: 1_700_000_000,
            end: 1_700_086_400,
            rate: 3_000_000_000_000_000_000,
        };
        let bytes = params.encode().expect("encode");
        assert_eq!(CreateParams::decode(&bytes).expect("decode"), params);
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let err = CreateParams::decode(&[0xff, 0x00, 0x13]).expect_err("garbage");
        assert!(matches!(err, SubscriptionError::InvalidParams(_)));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = CreateParams {
            start: 1,
            end: 2,
            rate: 3,
        }
        .encode()
        .expect("encode");
        let err = CreateParams::decode(&bytes[..bytes.len() - 1]).expect_err("truncated");
        assert!(matches!(err, SubscriptionError::InvalidParams(_)));
    }
}
