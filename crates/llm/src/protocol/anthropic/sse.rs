use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::UnknownFields;

use super::content::{ContentBlock, Message, StopReason, Usage};
use super::error::ErrorBody;

/// Server-sent events emitted by the Messages streaming API.
///
/// Streams open with [`StreamEvent::MessageStart`], emit one or more content
/// block lifecycles (`content_block_start` → `content_block_delta*` →
/// `content_block_stop`), then a [`StreamEvent::MessageDelta`] with the stop
/// reason and final usage, and finish with [`StreamEvent::MessageStop`].
/// Unknown payloads are preserved through [`StreamEvent::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Announces the streamed message with its id, model, and initial usage.
    MessageStart { message: Box<Message> },
    /// Opens a content block; the index is reused by delta and stop events.
    ContentBlockStart { index: u32, content_block: ContentBlock },
    /// Incremental update for the block at `index`.
    ContentBlockDelta { index: u32, delta: ContentDelta },
    /// Marks the end of updates for the indexed block.
    ContentBlockStop { index: u32 },
    /// Top-level message changes: stop reason and cumulative usage.
    MessageDelta {
        delta: MessageDelta,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// No further events follow.
    MessageStop,
    /// Heartbeat; may appear at any point.
    Ping,
    /// Recoverable API errors surfaced without tearing down the connection.
    Error { error: ErrorBody },
    /// Undocumented event types forwarded untouched.
    #[serde(untagged)]
    Unknown(Value),
}

impl StreamEvent {
    /// The SSE `event:` name for this payload.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Partial updates applied to the message by a `message_delta` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Incremental content payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Text fragment to append to a text block.
    TextDelta { text: String },
    /// Thinking fragment to append to a thinking block.
    ThinkingDelta { thinking: String },
    /// Signature fragment for the current thinking block.
    SignatureDelta { signature: String },
    /// Partial JSON for a tool_use block's input.
    InputJsonDelta { partial_json: String },
    #[serde(untagged)]
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn events_round_trip() {
        let events = json!([
            {"type": "message_start", "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "model": "claude-sonnet-4",
                "content": [], "usage": {"input_tokens": 3, "output_tokens": 1},
            }},
            {"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}},
            {"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "hello"}},
            {"type": "content_block_stop", "index": 0},
            {"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"input_tokens": 3, "output_tokens": 1}},
            {"type": "message_stop"},
        ]);

        let parsed: Vec<StreamEvent> = serde_json::from_value(events.clone()).unwrap();

        let names: Vec<_> = parsed.iter().map(StreamEvent::name).collect();
        assert_eq!(
            names,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(serde_json::to_value(&parsed).unwrap(), events);
    }

    #[test]
    fn thinking_deltas_parse() {
        let delta: ContentDelta =
            serde_json::from_value(json!({"type": "thinking_delta", "thinking": "pondering"})).unwrap();
        assert!(matches!(delta, ContentDelta::ThinkingDelta { .. }));

        let delta: ContentDelta =
            serde_json::from_value(json!({"type": "signature_delta", "signature": "sig"})).unwrap();
        assert!(matches!(delta, ContentDelta::SignatureDelta { .. }));
    }

    #[test]
    fn unknown_event_is_preserved() {
        let event = json!({"type": "content_block_ping", "index": 3});
        let parsed: StreamEvent = serde_json::from_value(event.clone()).unwrap();

        assert!(matches!(parsed, StreamEvent::Unknown(_)));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), event);
    }
}
