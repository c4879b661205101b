//! Event notifications.
//!
//! Lifecycle events drained from the engine are pushed to the client as
//! JSON-RPC notifications with `method = "event"`.

use serde::Serialize;
use subs_types::{LedgerEvent, Timestamp};

/// Parameters of an `event` notification.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Event type name (e.g. "Subscribed", "Collected").
    pub event_type: String,
    /// Engine time when the event was emitted.
    pub timestamp: Timestamp,
    /// Type-specific payload.
    pub payload: LedgerEvent,
}

/// JSON-RPC notification carrying one [`Event`].
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Event,
}

impl Notification {
    /// Wrap an engine event.
    pub fn new(event: LedgerEvent, timestamp: Timestamp) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: "event".to_string(),
            params: Event {
                event_type: event.name().to_string(),
                timestamp,
                payload: event,
            },
        }
    }
}
