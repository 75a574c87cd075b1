//! Request and wire payload models for the chat stream.

use serde::{Deserialize, Serialize};

/// Body of a streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// Message text typed by the user
    pub content: String,

    /// Routing/persona identifier the backend answers as
    pub persona: String,
}

impl ChatRequest {
    pub fn new(content: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            persona: persona.into(),
        }
    }
}

/// Interpreted result of one protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Non-empty piece of output text
    Content(String),

    /// Stream finished successfully
    Done,

    /// Backend reported a failure
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// Payload of a `data:` line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPayload {
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub done: bool,
}

/// Payload of the `data:` line following an `event:error` marker.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ChatRequest::new("hi", "luna")).unwrap();
        assert_eq!(body, serde_json::json!({"content": "hi", "persona": "luna"}));
    }

    #[test]
    fn test_data_payload_defaults() {
        let payload: DataPayload = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(payload.done);
        assert!(payload.content.is_empty());

        let payload: DataPayload =
            serde_json::from_str(r#"{"content": "x", "extra": 1}"#).unwrap();
        assert_eq!(payload.content, "x");
        assert!(!payload.done);
    }

    #[test]
    fn test_is_terminal() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error("boom".into()).is_terminal());
        assert!(!StreamEvent::Content("hi".into()).is_terminal());
    }
}
