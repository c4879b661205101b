//! Subscription lifecycle commands.

use serde_json::Value;
use subs_lifecycle::CreateParams;

use super::{address, amount, optional_address, to_json, uint};
use crate::rpc::RpcError;
use crate::state::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Start or replace a stream. `subscriber` defaults to `caller`.
pub fn subscribe(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let subscriber = optional_address(params, "subscriber")?.unwrap_or(caller);
    let start = uint(params, "start")?;
    let end = uint(params, "end")?;
    let rate = amount(params, "rate")?;

    let receipt = state.engine.subscribe(caller, subscriber, start, end, rate)?;
    to_json(&receipt)
}

/// Cancel the caller's stream.
pub fn unsubscribe(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let receipt = state.engine.unsubscribe(caller)?;
    to_json(&receipt)
}

/// Push a running stream's end later.
pub fn extend(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let subscriber = address(params, "subscriber")?;
    let end = uint(params, "end")?;
    let receipt = state.engine.extend(caller, subscriber, end)?;
    to_json(&receipt)
}

/// Extend a running stream by the time `amount` buys.
pub fn add_to(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let subscriber = address(params, "subscriber")?;
    let value = amount(params, "amount")?;
    let receipt = state.engine.add_to(caller, subscriber, value)?;
    to_json(&receipt)
}

/// Record an unfunded offer for the caller.
pub fn set_pending_subscription(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let start = uint(params, "start")?;
    let end = uint(params, "end")?;
    let rate = amount(params, "rate")?;
    let pending = state
        .engine
        .set_pending_subscription(caller, start, end, rate)?;
    to_json(&pending)
}

/// Fund another party's pending offer.
pub fn fulfil(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let owner = address(params, "owner")?;
    let funding = amount(params, "amount")?;
    let receipt = state.engine.fulfil(caller, owner, funding)?;
    to_json(&receipt)
}

/// Privileged create. `params` is either the hex-encoded CBOR payload or an
/// object with `start`, `end` and `rate`.
pub fn create(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let user = address(params, "user")?;
    let payload = match params.get("params") {
        Some(Value::String(text)) => hex::decode(text.strip_prefix("0x").unwrap_or(text))
            .map_err(|e| RpcError::invalid_params(&format!("params: {e}")))?,
        Some(fields @ Value::Object(_)) => CreateParams {
            start: uint(fields, "start")?,
            end: uint(fields, "end")?,
            rate: amount(fields, "rate")?,
        }
        .encode()?,
        _ => return Err(RpcError::invalid_params("params required")),
    };
    let receipt = state.engine.create(caller, user, &payload)?;
    to_json(&receipt)
}
