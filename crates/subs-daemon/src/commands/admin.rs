//! Signer and privileged-caller administration.

use serde_json::Value;

use super::address;
use crate::rpc::RpcError;
use crate::state::DaemonState;

type Result = std::result::Result<Value, RpcError>;

pub fn add_authorized_signer(state: &mut DaemonState, params: &Value) -> Result {
    let owner = address(params, "owner")?;
    let signer = address(params, "signer")?;
    let added = state.engine.add_authorized_signer(owner, signer)?;
    Ok(serde_json::json!({ "added": added }))
}

pub fn remove_authorized_signer(state: &mut DaemonState, params: &Value) -> Result {
    let owner = address(params, "owner")?;
    let signer = address(params, "signer")?;
    let removed = state.engine.remove_authorized_signer(owner, signer)?;
    Ok(serde_json::json!({ "removed": removed }))
}

pub fn set_recurring_payments(state: &mut DaemonState, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let recurring_payments = address(params, "recurring_payments")?;
    state
        .engine
        .set_recurring_payments(caller, recurring_payments)?;
    Ok(serde_json::json!({
        "recurring_payments": recurring_payments.to_string(),
    }))
}
