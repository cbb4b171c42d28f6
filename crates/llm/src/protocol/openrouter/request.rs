use serde::de::Error as _;
use serde::ser::SerializeMap as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::protocol::anthropic::CacheControl;

use super::response::ToolCall;

/// Format tag attached to reasoning details produced from Anthropic thinking
/// blocks.
pub const REASONING_FORMAT_ANTHROPIC_CLAUDE_V1: &str = "anthropic-claude-v1";

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,

    pub messages: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Stop>,

    #[serde(default)]
    pub stream: bool,

    /// Requests a trailing usage chunk on streamed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// End-user identifier forwarded for abuse detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Routing preferences for OpenRouter's provider selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,
}

/// A chat message in a request or a non-stream response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    /// Refusal text for responses the provider declined to complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,

    /// Plain reasoning text, mutually redundant with `reasoning_details`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_details: Option<Vec<ReasoningDetail>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For `tool` role messages, the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Chat roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    #[default]
    Assistant,
    Tool,
    #[serde(untagged)]
    Unknown(String),
}

/// Message content is a plain string or an array of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ImageUrl {
        image_url: ImageUrl,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl ContentPart {
    /// Cache breakpoints are only legal on text parts upstream.
    pub fn strip_non_text_cache_control(&mut self) {
        if let Self::ImageUrl { cache_control, .. } = self {
            *cache_control = None;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Structured reasoning entries carried on assistant messages and deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningDetail {
    #[serde(rename = "type")]
    pub kind: ReasoningDetailKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Encrypted payload for `reasoning.encrypted` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Attestation signature for `reasoning.text` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ReasoningDetailKind {
    #[default]
    #[serde(rename = "reasoning.text")]
    Text,
    #[serde(rename = "reasoning.summary")]
    Summary,
    #[serde(rename = "reasoning.encrypted")]
    Encrypted,
    #[serde(untagged)]
    Unknown(String),
}

/// `usage: {include: true}` asks for token accounting on the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageOptions {
    pub include: bool,
}

/// Function tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Always `function`.
    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema copied verbatim from the Anthropic `input_schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Reasoning budget for the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
}

/// Provider routing preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,

    pub require_parameters: bool,

    pub sort: String,
}

impl ProviderPreferences {
    /// Preferences restricted to the configured provider slugs; unrestricted
    /// when the list is empty.
    pub fn for_allowed(allowed: &[String]) -> Self {
        if allowed.is_empty() {
            Self {
                order: None,
                only: None,
                allow_fallbacks: None,
                require_parameters: false,
                sort: "throughput".to_string(),
            }
        } else {
            Self {
                order: Some(allowed.to_vec()),
                only: Some(allowed.to_vec()),
                allow_fallbacks: Some(false),
                require_parameters: false,
                sort: "throughput".to_string(),
            }
        }
    }
}

/// Stop sequences: a single string or an array of strings.
///
/// The wire shape is polymorphic, so serialization is written out by hand and
/// any other shape is rejected with an explicit error.
#[derive(Debug, Clone, PartialEq)]
pub enum Stop {
    One(String),
    Many(Vec<String>),
}

impl Serialize for Stop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::One(s) => serializer.serialize_str(s),
            Self::Many(values) => values.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Stop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self::One(s)),
            Value::Array(values) => values
                .into_iter()
                .map(|value| match value {
                    Value::String(s) => Ok(s),
                    other => Err(D::Error::custom(format!("stop array may only contain strings, got {other}"))),
                })
                .collect::<Result<_, _>>()
                .map(Self::Many),
            other => Err(D::Error::custom(format!("stop must be a string or an array of strings, got {other}"))),
        }
    }
}

/// Response format: the string `"text"` or an object `{type, json_schema?}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    Object { kind: String, json_schema: Option<Value> },
}

impl Serialize for ResponseFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text => serializer.serialize_str("text"),
            Self::Object { kind, json_schema } => {
                let len = 1 + usize::from(json_schema.is_some());
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("type", kind)?;
                if let Some(schema) = json_schema {
                    map.serialize_entry("json_schema", schema)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ResponseFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "text" => Ok(Self::Text),
            Value::String(s) => Err(D::Error::custom(format!("unsupported response_format string '{s}'"))),
            Value::Object(mut fields) => {
                let kind = match fields.remove("type") {
                    Some(Value::String(kind)) => kind,
                    _ => return Err(D::Error::custom("response_format object requires a string 'type'")),
                };
                Ok(Self::Object {
                    kind,
                    json_schema: fields.remove("json_schema"),
                })
            }
            other => Err(D::Error::custom(format!("unsupported response_format shape {other}"))),
        }
    }
}

/// Tool choice: a bare mode string or a `{type: function}` object.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Function { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoiceMode {
    Auto,
    None,
    Required,
}

impl ToolChoiceMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
            Self::Required => "required",
        }
    }
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Mode(mode) => serializer.serialize_str(mode.as_str()),
            Self::Function { name } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "function")?;
                map.serialize_entry("function", &serde_json::json!({ "name": name }))?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ToolChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => match s.as_str() {
                "auto" => Ok(Self::Mode(ToolChoiceMode::Auto)),
                "none" => Ok(Self::Mode(ToolChoiceMode::None)),
                "required" => Ok(Self::Mode(ToolChoiceMode::Required)),
                other => Err(D::Error::custom(format!("unsupported tool_choice mode '{other}'"))),
            },
            Value::Object(fields) => {
                if fields.get("type").and_then(Value::as_str) != Some("function") {
                    return Err(D::Error::custom("tool_choice object requires type 'function'"));
                }
                let name = fields
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| D::Error::custom("tool_choice object requires function.name"))?;
                Ok(Self::Function { name: name.to_string() })
            }
            other => Err(D::Error::custom(format!("unsupported tool_choice shape {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stop_accepts_string_and_array() {
        let one: Stop = serde_json::from_value(json!("END")).unwrap();
        assert_eq!(one, Stop::One("END".to_string()));

        let many: Stop = serde_json::from_value(json!(["END", "\n\n"])).unwrap();
        assert_eq!(many, Stop::Many(vec!["END".to_string(), "\n\n".to_string()]));

        assert_eq!(serde_json::to_value(&one).unwrap(), json!("END"));
        assert_eq!(serde_json::to_value(&many).unwrap(), json!(["END", "\n\n"]));
    }

    #[test]
    fn stop_rejects_other_shapes() {
        assert!(serde_json::from_value::<Stop>(json!(42)).is_err());
        assert!(serde_json::from_value::<Stop>(json!([1, 2])).is_err());
        assert!(serde_json::from_value::<Stop>(json!({"stop": "END"})).is_err());
    }

    #[test]
    fn response_format_accepts_text_and_object() {
        let text: ResponseFormat = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(text, ResponseFormat::Text);
        assert_eq!(serde_json::to_value(&text).unwrap(), json!("text"));

        let object: ResponseFormat =
            serde_json::from_value(json!({"type": "json_schema", "json_schema": {"name": "out"}})).unwrap();
        let ResponseFormat::Object { kind, json_schema } = &object else {
            unreachable!("expected object response_format");
        };
        assert_eq!(kind, "json_schema");
        assert_eq!(json_schema, &Some(json!({"name": "out"})));
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({"type": "json_schema", "json_schema": {"name": "out"}})
        );
    }

    #[test]
    fn response_format_rejects_other_shapes() {
        assert!(serde_json::from_value::<ResponseFormat>(json!("json")).is_err());
        assert!(serde_json::from_value::<ResponseFormat>(json!(1)).is_err());
        assert!(serde_json::from_value::<ResponseFormat>(json!({"json_schema": {}})).is_err());
    }

    #[test]
    fn tool_choice_accepts_mode_and_function() {
        let auto: ToolChoice = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(auto, ToolChoice::Mode(ToolChoiceMode::Auto));

        let function: ToolChoice =
            serde_json::from_value(json!({"type": "function", "function": {"name": "get_weather"}})).unwrap();
        assert_eq!(function, ToolChoice::Function { name: "get_weather".to_string() });

        assert_eq!(serde_json::to_value(&auto).unwrap(), json!("auto"));
        assert_eq!(
            serde_json::to_value(&function).unwrap(),
            json!({"type": "function", "function": {"name": "get_weather"}})
        );
    }

    #[test]
    fn tool_choice_rejects_other_shapes() {
        assert!(serde_json::from_value::<ToolChoice>(json!("sometimes")).is_err());
        assert!(serde_json::from_value::<ToolChoice>(json!({"type": "tool"})).is_err());
        assert!(serde_json::from_value::<ToolChoice>(json!({"type": "function"})).is_err());
    }

    #[test]
    fn provider_preferences_for_allowed() {
        let unrestricted = ProviderPreferences::for_allowed(&[]);
        assert!(unrestricted.order.is_none());
        assert_eq!(unrestricted.sort, "throughput");

        let restricted = ProviderPreferences::for_allowed(&["anthropic".to_string()]);
        assert_eq!(restricted.order.as_deref(), Some(&["anthropic".to_string()][..]));
        assert_eq!(restricted.only.as_deref(), Some(&["anthropic".to_string()][..]));
        assert_eq!(restricted.allow_fallbacks, Some(false));
        assert!(!restricted.require_parameters);
    }
}
