use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::UnknownFields;

/// A complete message as returned by the Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: String,

    /// Object type, always `message`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Author of the message.
    pub role: Role,

    /// Model that produced the message.
    pub model: String,

    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,

    /// Why generation stopped, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    /// The stop sequence that triggered completion, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,

    /// Billing counters for the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: "message".to_string(),
            role: Role::Assistant,
            model: String::new(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: None,
            unknown_fields: UnknownFields::default(),
        }
    }
}

/// Message roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(untagged)]
    Unknown(String),
}

/// A semantic unit of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Thinking(ThinkingBlock),
    RedactedThinking(RedactedThinkingBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    /// Content types we do not model, preserved verbatim for pass-through.
    #[serde(untagged)]
    Unknown(Value),
}

/// Plain text content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Base64 image content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub source: ImageSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Image payload descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Encoding of `data`, typically `base64`.
    #[serde(rename = "type")]
    pub kind: String,

    /// MIME type, e.g. `image/png`.
    pub media_type: String,

    /// The encoded image bytes.
    pub data: String,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl ImageSource {
    /// Renders the source as a `data:` URL for providers that take URLs.
    pub fn to_data_url(&self) -> String {
        format!("data:{};{},{}", self.media_type, self.kind, self.data)
    }
}

/// Extended-thinking content with its attestation signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub thinking: String,

    /// Opaque attestation over the thinking payload.
    #[serde(default)]
    pub signature: String,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Thinking content withheld by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedThinkingBlock {
    pub data: String,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    /// Tool arguments as a JSON object.
    pub input: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Outcome of a tool invocation, supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,

    /// Nested blocks may only be text or image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ToolResultContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool results arrive either as a bare string or as content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Cache breakpoint hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheControl {
    Ephemeral {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<CacheControlTtl>,

        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}

/// Supported TTLs for ephemeral cache control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheControlTtl {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(untagged)]
    Unknown(String),
}

/// The reason generation stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    PauseTurn,
    Refusal,
    #[serde(untagged)]
    Unknown(String),
}

/// Token counters reported alongside a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation: Option<CacheCreation>,

    /// Counters we do not model (service tier, server tool use) carried
    /// through untouched.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Cache-creation breakdown by TTL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheCreation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_5m_input_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_1h_input_tokens: Option<u64>,
}
