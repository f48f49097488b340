//! Update events pushed by the managed client over its WebSocket.
//!
//! Frames are JSON arrays of the form `[opcode, eventName, payload]`. The
//! gateway subscribes once with `[5, "OnJsonApiEvent"]` and from then on
//! receives `[8, "OnJsonApiEvent", {eventType, uri, data}]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opcode of the subscribe control frame.
pub const SUBSCRIBE_OPCODE: u64 = 5;
/// Opcode carried by every event frame.
pub const EVENT_OPCODE: u64 = 8;
/// Event name that covers every resource.
pub const JSON_API_EVENT: &str = "OnJsonApiEvent";

/// What happened to the resource at `uri`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RcuEventType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for RcuEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// A single resource change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcuEvent {
    #[serde(rename = "eventType")]
    pub event_type: RcuEventType,
    pub uri: String,
    #[serde(default)]
    pub data: Value,
}

/// The frame that subscribes to every resource event.
pub fn subscribe_frame() -> String {
    Value::Array(vec![SUBSCRIBE_OPCODE.into(), JSON_API_EVENT.into()]).to_string()
}

/// Parse one complete text message into an event.
///
/// `event_name` is the subscription the frame must belong to.
pub fn parse_frame(text: &str, event_name: &str) -> Result<RcuEvent, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(mut parts) = value else {
        return Err(FrameError::NotAnArray);
    };
    if parts.len() != 3 {
        return Err(FrameError::WrongArity(parts.len()));
    }

    if parts[0].as_u64() != Some(EVENT_OPCODE) {
        return Err(FrameError::UnexpectedOpcode(parts[0].clone()));
    }
    match parts[1].as_str() {
        Some(name) if name == event_name => {}
        _ => return Err(FrameError::UnexpectedEvent(parts[1].clone())),
    }

    let payload = parts.pop().unwrap_or(Value::Null);
    serde_json::from_value(payload).map_err(FrameError::Payload)
}

/// Error decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("frame has {0} elements, expected 3")]
    WrongArity(usize),
    #[error("unexpected opcode {0}")]
    UnexpectedOpcode(Value),
    #[error("unexpected event name {0}")]
    UnexpectedEvent(Value),
    #[error("invalid event payload: {0}")]
    Payload(#[source] serde_json::Error),
}
