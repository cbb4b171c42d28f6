use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::UnknownFields;

use super::content::{CacheControl, ContentBlock, Role};

/// Request body for the Messages API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateMessageRequest {
    /// The model that will complete the prompt.
    pub model: String,

    /// Conversation turns.
    pub messages: Vec<InputMessage>,

    /// Maximum output tokens the upstream may generate.
    pub max_tokens: u32,

    /// System prompt providing global instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Custom strings that stop generation when produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// When true, deliver a Server-Sent Events stream instead of one body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Directive controlling if and how the model must use tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Extended-thinking configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl GenerateMessageRequest {
    /// Whether the request references any server-managed tool.
    pub fn has_server_tool(&self) -> bool {
        self.tools
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|tool| !tool.is_custom())
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: InputContent,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Message bodies arrive as a raw string or as structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// System prompt payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// End-user metadata forwarded upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name surfaced to the model and in tool_use blocks.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tool category; unset means custom.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,

    /// JSON Schema for the tool's input payload. Server-managed tools omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    /// Type-specific fields (e.g. web_search domain filters) carried through.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Tool {
    /// Tools with no type are custom tools.
    pub fn is_custom(&self) -> bool {
        matches!(self.kind, None | Some(ToolKind::Custom))
    }
}

/// Tool categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Custom,
    /// Server-managed tool types (`web_search_*`, `computer_*`, `bash_*`, ...).
    #[serde(untagged)]
    Server(String),
}

/// Controls how the model may interact with tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,

        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Any {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,

        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Tool {
        /// Name of the required tool.
        name: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,

        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    None {
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}

impl ToolChoice {
    pub fn none() -> Self {
        Self::None {
            unknown_fields: UnknownFields::default(),
        }
    }

    pub fn disable_parallel_tool_use(&self) -> Option<bool> {
        match self {
            Self::Auto {
                disable_parallel_tool_use,
                ..
            }
            | Self::Any {
                disable_parallel_tool_use,
                ..
            }
            | Self::Tool {
                disable_parallel_tool_use,
                ..
            } => *disable_parallel_tool_use,
            _ => None,
        }
    }
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled {
        budget_tokens: u32,

        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Disabled {
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_minimal_request() {
        let request: GenerateMessageRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 500,
            "stream": true,
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
        }))
        .unwrap();

        assert_eq!(request.model, "claude-sonnet-4");
        assert_eq!(request.max_tokens, 500);
        assert_eq!(request.stream, Some(true));
        assert!(!request.has_server_tool());
    }

    #[test]
    fn untyped_tool_is_custom() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "get_weather",
            "input_schema": {"type": "object"},
        }))
        .unwrap();

        assert!(tool.is_custom());
    }

    #[test]
    fn server_tool_is_detected() {
        let request: GenerateMessageRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 100,
            "messages": [],
            "tools": [
                {"name": "get_weather", "input_schema": {"type": "object"}},
                {"type": "web_search_20250305", "name": "web_search", "max_uses": 5},
            ],
        }))
        .unwrap();

        assert!(request.has_server_tool());

        let web_search = &request.tools.as_ref().unwrap()[1];
        assert_eq!(web_search.kind, Some(ToolKind::Server("web_search_20250305".to_string())));
        assert_eq!(web_search.unknown_fields.get("max_uses"), Some(&json!(5)));
    }

    #[test]
    fn tool_choice_variants() {
        let auto: ToolChoice =
            serde_json::from_value(json!({"type": "auto", "disable_parallel_tool_use": true})).unwrap();
        assert_eq!(auto.disable_parallel_tool_use(), Some(true));

        let tool: ToolChoice = serde_json::from_value(json!({"type": "tool", "name": "get_weather"})).unwrap();
        let ToolChoice::Tool { name, .. } = &tool else {
            unreachable!("expected tool choice");
        };
        assert_eq!(name, "get_weather");

        let none: ToolChoice = serde_json::from_value(json!({"type": "none"})).unwrap();
        assert!(matches!(none, ToolChoice::None { .. }));
    }

    #[test]
    fn thinking_config_variants() {
        let enabled: ThinkingConfig =
            serde_json::from_value(json!({"type": "enabled", "budget_tokens": 2048})).unwrap();
        let ThinkingConfig::Enabled { budget_tokens, .. } = enabled else {
            unreachable!("expected enabled thinking");
        };
        assert_eq!(budget_tokens, 2048);

        let disabled: ThinkingConfig = serde_json::from_value(json!({"type": "disabled"})).unwrap();
        assert!(matches!(disabled, ThinkingConfig::Disabled { .. }));
    }

    #[test]
    fn string_content_round_trips() {
        let message: InputMessage = serde_json::from_value(json!({"role": "user", "content": "plain"})).unwrap();
        assert!(matches!(message.content, InputContent::Text(_)));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "user", "content": "plain"})
        );
    }
}
