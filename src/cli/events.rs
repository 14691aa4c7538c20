//! Event types from Gemini CLI stream-json output.
//!
//! Gemini emits one JSON object per line when running with
//! `-o stream-json`. The bridge only inspects a handful of fields, so events
//! are kept as raw JSON objects with typed accessors rather than a closed
//! enum of every event shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event types that mark the end of a turn.
pub const TERMINAL_EVENT_TYPES: &[&str] = &["turn.completed", "result"];

/// A single line of stream-json output that decoded as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamEvent(Map<String, Value>);

impl StreamEvent {
    /// Parse a line into an event.
    ///
    /// Returns `None` if the line is not valid JSON or is not an object.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Some(Self(map)),
            _ => None,
        }
    }

    /// The event discriminator (the `type` field).
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The message role, if any.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    /// The raw `content` value, if present and non-null.
    #[must_use]
    pub fn content(&self) -> Option<&Value> {
        self.0.get("content").filter(|v| !v.is_null())
    }

    /// The raw `session_id` value, if present and non-null.
    #[must_use]
    pub fn session_id(&self) -> Option<&Value> {
        self.0.get("session_id").filter(|v| !v.is_null())
    }

    /// Returns true if this is an assistant message event.
    #[must_use]
    pub fn is_assistant_message(&self) -> bool {
        self.kind() == Some("message") && self.role() == Some("assistant")
    }

    /// Returns true if this is a terminal event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind()
            .is_some_and(|kind| TERMINAL_EVENT_TYPES.contains(&kind))
    }

    /// Consume the event, returning the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Check whether a raw output line is a turn-completed event.
///
/// Anything that is not a JSON object with a terminal `type` is treated as
/// "not complete yet"; this never fails.
#[must_use]
pub fn is_turn_completed(line: &str) -> bool {
    StreamEvent::parse(line).is_some_and(|event| event.is_terminal())
}
