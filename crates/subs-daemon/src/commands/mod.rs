//! RPC command handlers.
//!
//! Each submodule implements the commands for one category. Parameters are
//! named fields of a JSON object; addresses are hex strings, amounts and
//! times are JSON numbers or decimal strings.

pub mod accounts;
pub mod admin;
pub mod ledger;
pub mod lifecycle;

use serde::Serialize;
use serde_json::Value;
use subs_types::{Address, Amount};

use crate::rpc::RpcError;

type Result<T> = std::result::Result<T, RpcError>;

fn required<'a>(params: &'a Value, key: &str) -> Result<&'a Value> {
    params
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Required hex address.
pub(crate) fn address(params: &Value, key: &str) -> Result<Address> {
    let text = required(params, key)?
        .as_str()
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a hex string")))?;
    text.parse()
        .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

/// Optional hex address.
pub(crate) fn optional_address(params: &Value, key: &str) -> Result<Option<Address>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => address(params, key).map(Some),
    }
}

/// Required non-negative integer, as a JSON number or decimal string.
pub(crate) fn amount(params: &Value, key: &str) -> Result<Amount> {
    let parsed = match required(params, key)? {
        Value::String(text) => text.parse::<Amount>().ok(),
        number @ Value::Number(_) => serde_json::from_value::<Amount>(number.clone()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RpcError::invalid_params(&format!("{key} must be a non-negative integer"))
    })
}

/// Required `u64` (times, epochs).
pub(crate) fn uint(params: &Value, key: &str) -> Result<u64> {
    let value = amount(params, key)?;
    u64::try_from(value).map_err(|_| RpcError::invalid_params(&format!("{key} out of range")))
}

/// Serialize a handler result.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::internal_error(&format!("serialization failed: {e}")))
}
