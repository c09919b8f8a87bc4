use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
/// Dispatched payload carried across WebSocket and SSE channels.
pub struct ServerEvent {
    /// Event name, also used as the SSE `event:` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// JSON payload of the event.
    pub data: Value,
}

impl ServerEvent {
    /// Build an event from an already serialized payload.
    pub fn new(event: Option<String>, data: Value) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(payload)?,
        })
    }
}
