//! Collection and read-only ledger queries.

use serde_json::Value;
use subs_ledger::accrual::Accrual;

use super::{address, to_json, uint};
use crate::rpc::RpcError;
use crate::state::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Realize every completed epoch.
pub fn collect(state: &mut DaemonState) -> Result {
    let collected = state.engine.collect()?;
    Ok(serde_json::json!({
        "amount": collected,
        "next_uncollected": state.engine.ledger().cursor().next_uncollected(),
    }))
}

/// Realize epochs up to `epoch`, which must have ended.
pub fn collect_through(state: &mut DaemonState, params: &Value) -> Result {
    let upto = uint(params, "epoch")?;
    let collected = state.engine.collect_through(upto)?;
    Ok(serde_json::json!({
        "amount": collected,
        "next_uncollected": state.engine.ledger().cursor().next_uncollected(),
    }))
}

/// Current stream of `subscriber` with its accrual at the current time.
pub fn get_subscription(state: &mut DaemonState, params: &Value) -> Result {
    let subscriber = address(params, "subscriber")?;
    let now = state.engine.now();
    match state.engine.subscription(&subscriber) {
        Some(stream) => Ok(serde_json::json!({
            "subscription": to_json(stream)?,
            "locked": stream.locked(now),
            "unlocked": stream.unlocked(now),
        })),
        None => Ok(serde_json::json!({ "subscription": null })),
    }
}

/// Pending offer for `owner`.
pub fn get_pending_subscription(state: &mut DaemonState, params: &Value) -> Result {
    let owner = address(params, "owner")?;
    let pending = state.engine.pending_subscription(&owner);
    Ok(serde_json::json!({ "pending_subscription": to_json(&pending)? }))
}

/// Logical bucket at `epoch`.
pub fn get_bucket(state: &mut DaemonState, params: &Value) -> Result {
    let epoch = uint(params, "epoch")?;
    to_json(&state.engine.ledger().bucket(epoch))
}

/// Collection cursor plus the current epoch and what `collect` would pay.
pub fn get_cursor(state: &mut DaemonState) -> Result {
    let cursor = state.engine.ledger().cursor();
    let current_epoch = state.engine.ledger().epoch_of(state.engine.now());
    let collectable = state.engine.collectable()?;
    Ok(serde_json::json!({
        "next_uncollected": cursor.next_uncollected(),
        "running_rate": cursor.running_rate(),
        "current_epoch": current_epoch,
        "collectable": collectable,
    }))
}
