//! Line-delimited JSON-RPC 2.0 over a byte stream (stdin/stdout in the
//! daemon).
//!
//! Requests are applied one at a time, in arrival order. Events produced by
//! a request are written as `event` notifications right after its response.

use serde::{Deserialize, Serialize};
use subs_lifecycle::SubscriptionError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::commands;
use crate::events::Notification;
use crate::state::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, detail: Option<String>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: detail.map(|detail| serde_json::json!({ "detail": detail })),
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({ "method": method })),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(-32602, "INVALID_PARAMS", Some(detail.to_string()))
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(-32603, "INTERNAL_ERROR", Some(detail.to_string()))
    }

    // Lifecycle errors

    /// Invalid party (-33001).
    pub fn invalid_party(detail: &str) -> Self {
        Self::new(-33001, "INVALID_PARTY", Some(detail.to_string()))
    }

    /// Invalid range (-33002).
    pub fn invalid_range(detail: &str) -> Self {
        Self::new(-33002, "INVALID_RANGE", Some(detail.to_string()))
    }

    /// State conflict (-33003).
    pub fn state_conflict(detail: &str) -> Self {
        Self::new(-33003, "STATE_CONFLICT", Some(detail.to_string()))
    }

    /// Insufficient funds (-33004).
    pub fn insufficient_funds(required: u128, available: u128) -> Self {
        Self {
            code: -33004,
            message: "INSUFFICIENT_FUNDS".to_string(),
            data: Some(serde_json::json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        }
    }

    /// Unauthorized (-33005).
    pub fn unauthorized(detail: &str) -> Self {
        Self::new(-33005, "UNAUTHORIZED", Some(detail.to_string()))
    }
}

impl From<SubscriptionError> for RpcError {
    fn from(err: SubscriptionError) -> Self {
        match &err {
            SubscriptionError::InvalidParty(detail) => Self::invalid_party(detail),
            SubscriptionError::InvalidRange(detail) => Self::invalid_range(detail),
            SubscriptionError::StateConflict(detail) => Self::state_conflict(detail),
            SubscriptionError::InsufficientFunds {
                required,
                available,
            } => Self::insufficient_funds(*required, *available),
            SubscriptionError::Unauthorized(detail) => Self::unauthorized(detail),
            SubscriptionError::InvalidParams(detail) => Self::invalid_params(detail),
            SubscriptionError::Overflow
            | SubscriptionError::Transfer(_)
            | SubscriptionError::Ledger(_) => Self::internal_error(&err.to_string()),
        }
    }
}

/// Serve requests from `reader` until EOF, writing responses and event
/// notifications to `writer`.
pub async fn serve<R, W>(state: &mut DaemonState, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(state, request),
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };
        write_line(&mut writer, &response).await?;

        let now = state.engine.now();
        for event in state.engine.drain_events() {
            write_line(&mut writer, &Notification::new(event, now)).await?;
        }
    }
    Ok(())
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub fn dispatch_request(state: &mut DaemonState, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Lifecycle
        "subscribe" => commands::lifecycle::subscribe(state, params),
        "unsubscribe" => commands::lifecycle::unsubscribe(state, params),
        "extend" => commands::lifecycle::extend(state, params),
        "add_to" => commands::lifecycle::add_to(state, params),
        "set_pending_subscription" => commands::lifecycle::set_pending_subscription(state, params),
        "fulfil" => commands::lifecycle::fulfil(state, params),
        "create" => commands::lifecycle::create(state, params),

        // Administration
        "add_authorized_signer" => commands::admin::add_authorized_signer(state, params),
        "remove_authorized_signer" => commands::admin::remove_authorized_signer(state, params),
        "set_recurring_payments" => commands::admin::set_recurring_payments(state, params),

        // Ledger
        "collect" => commands::ledger::collect(state),
        "collect_through" => commands::ledger::collect_through(state, params),
        "get_subscription" => commands::ledger::get_subscription(state, params),
        "get_pending_subscription" => commands::ledger::get_pending_subscription(state, params),
        "get_bucket" => commands::ledger::get_bucket(state, params),
        "get_cursor" => commands::ledger::get_cursor(state),

        // Accounts and time
        "balance_of" => commands::accounts::balance_of(state, params),
        "approve" => commands::accounts::approve(state, params),
        "advance_time" => commands::accounts::advance_time(state, params),

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            warn!(method, code = err.code, message = %err.message, "RPC request rejected");
            RpcResponse::error(id, err)
        }
    }
}
