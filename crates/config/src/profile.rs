use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

use crate::Provider;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_REASONING_DELIMITER: &str = "/";

/// A single profile as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileConfig {
    /// Model patterns this profile serves: an exact name, a `prefix-*` glob,
    /// or the catch-all `*`.
    #[serde(default)]
    pub models: Vec<String>,

    /// Which upstream serves matching requests.
    #[serde(default)]
    pub provider: Option<Provider>,

    /// Translation and dispatch options.
    #[serde(default)]
    pub options: Options,

    /// Anthropic upstream settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// OpenRouter upstream settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// Per-profile translation options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    /// Request strict JSON-schema adherence for translated function tools.
    #[serde(default)]
    pub strict: bool,

    /// Rewrite empty tool-result texts to a placeholder before forwarding.
    #[serde(default)]
    pub prevent_empty_text_tool_result: bool,

    /// Reasoning shaping applied on the OpenRouter boundary.
    #[serde(default)]
    pub reasoning: ReasoningOptions,

    /// Model renames applied before dispatch.
    #[serde(default)]
    pub models: BTreeMap<String, String>,

    /// Multiplier applied to every reported token count.
    #[serde(default)]
    pub context_window_resize_factor: Option<f64>,

    /// Skip the count-tokens probe used to seed `input_tokens`.
    #[serde(default)]
    pub disable_count_tokens_request: bool,

    /// Raise `max_tokens` to at least this value.
    #[serde(default)]
    pub min_max_tokens: Option<u32>,

    /// Tools removed from the request before translation.
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
}

/// Reasoning-related options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasoningOptions {
    /// Reasoning format for models not covered by
    /// `openrouter.model_reasoning_format`.
    #[serde(default)]
    pub format: Option<ReasoningFormat>,

    /// Default reasoning effort for `openai-responses-v1` models.
    #[serde(default)]
    pub effort: Option<String>,

    /// Delimiter splitting a thinking signature into `{id, data}`.
    #[serde(default)]
    pub delimiter: Option<String>,
}

/// How thinking content is shaped on the OpenRouter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ReasoningFormat {
    #[serde(rename = "anthropic-claude-v1")]
    AnthropicClaudeV1,
    #[serde(rename = "openai-responses-v1")]
    OpenaiResponsesV1,
    #[serde(rename = "google-gemini-v1")]
    GoogleGeminiV1,
    /// Unrecognized formats behave like `anthropic-claude-v1`.
    #[serde(untagged)]
    Unknown(String),
}

impl Default for ReasoningFormat {
    fn default() -> Self {
        Self::AnthropicClaudeV1
    }
}

impl ReasoningFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnthropicClaudeV1 => "anthropic-claude-v1",
            Self::OpenaiResponsesV1 => "openai-responses-v1",
            Self::GoogleGeminiV1 => "google-gemini-v1",
            Self::Unknown(other) => other,
        }
    }
}

/// Anthropic upstream settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicConfig {
    /// Forward the client's body bytes untouched instead of re-serializing.
    #[serde(default)]
    pub use_raw_request_body: bool,

    /// Forward upstream response bodies verbatim while parsing a copy for the
    /// snapshot.
    #[serde(default)]
    pub enable_pass_through_mode: bool,

    /// Strip `blocked_domains` from the web_search tool before forwarding.
    #[serde(default)]
    pub disable_web_search_blocked_domains: bool,

    /// Enable thinking with a generous budget when the client did not ask.
    #[serde(default)]
    pub force_thinking: bool,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// `anthropic-version` header value.
    #[serde(default)]
    pub version: Option<String>,

    /// Backend the count-tokens endpoint proxies to; defaults to `base_url`.
    #[serde(default)]
    pub count_tokens_backend: Option<String>,
}

/// OpenRouter upstream settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Per-model reasoning format overrides, keyed by the mapped model name.
    #[serde(default)]
    pub model_reasoning_format: BTreeMap<String, ReasoningFormat>,

    /// Restrict routing to these provider slugs.
    #[serde(default)]
    pub allowed_providers: Vec<String>,
}

/// A named profile with defaulted accessors.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    config: ProfileConfig,
}

impl Profile {
    pub fn new(name: String, config: ProfileConfig) -> Self {
        Self { name, config }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> Provider {
        self.config.provider.unwrap_or(Provider::Anthropic)
    }

    pub fn options(&self) -> &Options {
        &self.config.options
    }

    pub fn anthropic(&self) -> &AnthropicConfig {
        &self.config.anthropic
    }

    pub fn openrouter(&self) -> &OpenRouterConfig {
        &self.config.openrouter
    }

    pub fn anthropic_base_url(&self) -> &str {
        self.config.anthropic.base_url.as_deref().unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
    }

    pub fn openrouter_base_url(&self) -> &str {
        self.config
            .openrouter
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENROUTER_BASE_URL)
    }

    pub fn anthropic_version(&self) -> &str {
        self.config.anthropic.version.as_deref().unwrap_or(DEFAULT_ANTHROPIC_VERSION)
    }

    pub fn count_tokens_backend(&self) -> &str {
        self.config
            .anthropic
            .count_tokens_backend
            .as_deref()
            .unwrap_or_else(|| self.anthropic_base_url())
    }

    /// The mapped upstream model name, falling back to the requested name.
    pub fn map_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.config.options.models.get(model).map(String::as_str).unwrap_or(model)
    }

    /// Reasoning format for `model`, checking per-model overrides first.
    pub fn reasoning_format(&self, model: &str) -> ReasoningFormat {
        self.config
            .openrouter
            .model_reasoning_format
            .get(model)
            .or(self.config.options.reasoning.format.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    pub fn reasoning_delimiter(&self) -> &str {
        self.config
            .options
            .reasoning
            .delimiter
            .as_deref()
            .unwrap_or(DEFAULT_REASONING_DELIMITER)
    }

    pub fn reasoning_effort(&self) -> &str {
        self.config.options.reasoning.effort.as_deref().unwrap_or_default()
    }

    pub fn context_window_resize_factor(&self) -> f64 {
        self.config.options.context_window_resize_factor.unwrap_or(1.0)
    }

    /// Configuration summary safe to embed in snapshots: no credentials.
    pub fn redacted_config(&self) -> serde_json::Value {
        let options = self.options();

        serde_json::json!({
            "provider": self.provider().as_str(),
            "models": &self.config.models,
            "options": {
                "strict": options.strict,
                "prevent_empty_text_tool_result": options.prevent_empty_text_tool_result,
                "reasoning": {
                    "format": options.reasoning.format.as_ref().map(ReasoningFormat::as_str),
                    "effort": &options.reasoning.effort,
                    "delimiter": self.reasoning_delimiter(),
                },
                "models": &options.models,
                "context_window_resize_factor": self.context_window_resize_factor(),
                "disable_count_tokens_request": options.disable_count_tokens_request,
                "min_max_tokens": options.min_max_tokens,
                "disallowed_tools": &options.disallowed_tools,
            },
            "anthropic": {
                "base_url": self.anthropic_base_url(),
                "version": self.anthropic_version(),
                "use_raw_request_body": self.anthropic().use_raw_request_body,
                "enable_pass_through_mode": self.anthropic().enable_pass_through_mode,
                "disable_web_search_blocked_domains": self.anthropic().disable_web_search_blocked_domains,
                "force_thinking": self.anthropic().force_thinking,
            },
            "openrouter": {
                "base_url": self.openrouter_base_url(),
                "allowed_providers": &self.openrouter().allowed_providers,
            },
        })
    }
}

/// Immutable, ordered view over the configured profiles.
///
/// Constructed once per configuration load; a reload builds a fresh manager
/// and publishes it atomically so in-flight requests keep their snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProfileManager {
    profiles: Vec<Profile>,
}

impl ProfileManager {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }

    /// Returns the first profile, in definition order, whose pattern list
    /// matches `model`.
    pub fn find(&self, model: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|profile| profile.config.models.iter().any(|pattern| pattern_matches(pattern, model)))
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }
}

/// A pattern matches if it equals the model, if it is the catch-all `*`, or
/// if it ends in `*` and the model starts with the prefix.
fn pattern_matches(pattern: &str, model: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => pattern == model,
    }
}
