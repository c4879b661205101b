//! Vault accounts and the manual clock.

use serde_json::Value;

use super::{address, amount, uint};
use crate::rpc::RpcError;
use crate::state::{DaemonClock, DaemonState};

type Result = std::result::Result<Value, RpcError>;

/// Balance and remaining approval of `account`.
pub fn balance_of(state: &mut DaemonState, params: &Value) -> Result {
    let account = address(params, "account")?;
    let vault = state.engine.transfer();
    Ok(serde_json::json!({
        "balance": vault.balance_of(&account),
        "allowance": vault.allowance(&account),
    }))
}

/// Set the amount `account` lets the ledger pull.
pub fn approve(state: &mut DaemonState, params: &Value) -> Result {
    let account = address(params, "account")?;
    let value = amount(params, "amount")?;
    state.engine.transfer_mut().approve(account, value);
    Ok(serde_json::json!({ "allowance": value }))
}

/// Move the manual clock forward, by `by` units or to `to`.
pub fn advance_time(state: &mut DaemonState, params: &Value) -> Result {
    let DaemonClock::Manual(clock) = &state.clock else {
        return Err(RpcError::invalid_params("clock is not manual"));
    };
    let now = if params.get("to").is_some() {
        let to = uint(params, "to")?;
        let to = i64::try_from(to).map_err(|_| RpcError::invalid_params("to out of range"))?;
        clock.set(to)
    } else {
        let by = uint(params, "by")?;
        let by = i64::try_from(by).map_err(|_| RpcError::invalid_params("by out of range"))?;
        clock.advance(by)
    };
    Ok(serde_json::json!({ "now": now }))
}
