//! Event bus types.
//!
//! Every session owns a broadcast channel of [`Envelope`]s; the WebSocket
//! handlers are its subscribers. Events are published in occurrence order
//! under the session lock: a `state` update always precedes the events
//! that depend on it, and console output is emitted in program order.

use armlet::arch::Word;
use serde::Serialize;
use uuid::Uuid;

/// A published event with its session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Originating session.
    pub session_id: Uuid,
    /// Event payload.
    #[serde(flatten)]
    pub payload: Payload,
}

/// Event payload, tagged for the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    /// Machine status transition.
    State(StateData),
    /// Console output.
    Output(OutputData),
    /// Debugger or fault event.
    Event(EventData),
}

/// `state` payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    /// Status wire name.
    pub status: &'static str,
    /// Current program counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc: Option<Word>,
    /// Register snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registers: Option<[Word; 16]>,
}

/// `output` payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    /// Output stream name.
    pub stream: &'static str,
    /// UTF-8 content (lossily decoded).
    pub content: String,
}

/// `event` payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Event name: `breakpoint_hit`, `watchpoint_hit`, `halted`, `error`,
    /// `cycle_limit_exceeded`, or `dropped`.
    pub event: &'static str,
    /// Relevant address, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Word>,
    /// Human-readable context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_serialize_to_the_wire_shape() {
        let envelope = Envelope {
            session_id: Uuid::nil(),
            payload: Payload::Event(EventData {
                event: "breakpoint_hit",
                address: Some(0x8008),
                message: None,
            }),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["data"]["event"], "breakpoint_hit");
        assert_eq!(json["data"]["address"], 0x8008);
        assert!(json["data"].get("message").is_none());

        let envelope = Envelope {
            session_id: Uuid::nil(),
            payload: Payload::Output(OutputData {
                stream: "stdout",
                content: "Hello".to_string(),
            }),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["data"]["content"], "Hello");
    }
}
