use config::{Profile, ReasoningFormat};

use crate::error::{Error, Result};
use crate::protocol::anthropic::{
    ContentBlock, GenerateMessageRequest, InputContent, InputMessage, SystemPrompt, ThinkingConfig,
    ToolChoice as AnthropicToolChoice, ToolKind, ToolResultContent,
};
use crate::protocol::openrouter::{
    ChatCompletionRequest, ChatMessage, ChatRole, ContentPart, FunctionCall, FunctionDefinition, ImageUrl,
    MessageContent, ProviderPreferences, ReasoningConfig, ReasoningDetail, ReasoningDetailKind, Stop, Tool, ToolCall,
    ToolChoice, ToolChoiceMode, UsageOptions, REASONING_FORMAT_ANTHROPIC_CLAUDE_V1,
};

/// Placeholder substituted for empty tool-result texts when the profile asks
/// for it; some providers reject empty text parts outright.
const EMPTY_TOOL_RESULT_TEXT: &str = "(No content)";

/// When thinking is forced on a request that never asked for it, budgets this
/// small would starve the answer, so the window is raised first.
const FORCE_THINKING_MIN_MAX_TOKENS: u32 = 1024;
const FORCE_THINKING_RAISED_MAX_TOKENS: u32 = 32768;

/// Removes tools named in the profile's `disallowed_tools` list.
///
/// Dropping every tool forces `tool_choice: none`; a `tool_choice` that
/// names a removed tool is rewritten to `none` as well.
pub fn filter_disallowed_tools(request: &mut GenerateMessageRequest, disallowed: &[String]) {
    if disallowed.is_empty() {
        return;
    }

    let Some(tools) = &mut request.tools else {
        return;
    };

    let before = tools.len();
    tools.retain(|tool| !disallowed.contains(&tool.name));

    if tools.is_empty() {
        if before > 0 {
            request.tools = None;
            request.tool_choice = Some(AnthropicToolChoice::none());
        }
        return;
    }

    if let Some(AnthropicToolChoice::Tool { name, .. }) = &request.tool_choice
        && !tools.iter().any(|tool| &tool.name == name)
    {
        request.tool_choice = Some(AnthropicToolChoice::none());
    }
}

/// Ingress normalization applied before dispatch, for both upstreams.
pub fn normalize_request(request: &mut GenerateMessageRequest, profile: &Profile) {
    filter_disallowed_tools(request, &profile.options().disallowed_tools);

    if let Some(tools) = &mut request.tools {
        for tool in tools {
            if tool.kind.is_none() {
                tool.kind = Some(ToolKind::Custom);
            }

            if profile.anthropic().disable_web_search_blocked_domains
                && matches!(&tool.kind, Some(ToolKind::Server(kind)) if kind.starts_with("web_search"))
            {
                tool.unknown_fields.remove("blocked_domains");
            }
        }
    }

    if profile.options().prevent_empty_text_tool_result {
        for message in &mut request.messages {
            let InputContent::Blocks(blocks) = &mut message.content else {
                continue;
            };

            for block in blocks {
                let ContentBlock::ToolResult(result) = block else {
                    continue;
                };

                match &mut result.content {
                    None => result.content = Some(ToolResultContent::Text(EMPTY_TOOL_RESULT_TEXT.to_string())),
                    Some(ToolResultContent::Text(text)) if text.is_empty() => {
                        *text = EMPTY_TOOL_RESULT_TEXT.to_string();
                    }
                    Some(ToolResultContent::Blocks(nested)) => {
                        if nested.is_empty() {
                            result.content = Some(ToolResultContent::Text(EMPTY_TOOL_RESULT_TEXT.to_string()));
                            continue;
                        }
                        for nested_block in nested {
                            if let ContentBlock::Text(text) = nested_block
                                && text.text.is_empty()
                            {
                                text.text = EMPTY_TOOL_RESULT_TEXT.to_string();
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Translates an Anthropic request into an OpenRouter one.
///
/// The upstream call is always streamed internally; non-stream client
/// requests are assembled back from the stream by the dispatcher.
pub fn translate_request(request: &GenerateMessageRequest, profile: &Profile) -> Result<ChatCompletionRequest> {
    let mut model = profile.map_model(&request.model).to_string();
    let format = profile.reasoning_format(&model);

    let mut max_tokens = request.max_tokens;
    if let Some(min) = profile.options().min_max_tokens
        && max_tokens < min
    {
        max_tokens = min;
    }

    let mut reasoning = match &request.thinking {
        Some(ThinkingConfig::Enabled { budget_tokens, .. }) => Some(ReasoningConfig {
            enabled: Some(true),
            max_tokens: Some(*budget_tokens),
            effort: None,
        }),
        Some(ThinkingConfig::Disabled { .. }) => Some(ReasoningConfig {
            enabled: Some(false),
            max_tokens: None,
            effort: None,
        }),
        Some(ThinkingConfig::Unknown(_)) | None => None,
    };

    match format {
        ReasoningFormat::OpenaiResponsesV1 => {
            if let Some(reasoning) = &mut reasoning {
                reasoning.max_tokens = None;
            }

            let effort = match model.rsplit_once(':') {
                Some((base, suffix)) => {
                    let (base, suffix) = (base.to_string(), suffix.to_string());
                    model = base;
                    suffix
                }
                None => profile.reasoning_effort().to_string(),
            };

            if !effort.is_empty() {
                reasoning.get_or_insert_with(ReasoningConfig::default).effort = Some(effort);
            }
        }
        ReasoningFormat::GoogleGeminiV1 => {
            let reasoning = reasoning.get_or_insert_with(ReasoningConfig::default);
            reasoning.enabled = Some(true);
            reasoning.effort = None;
        }
        // The default format keeps budgets as-is and may force thinking on.
        ReasoningFormat::AnthropicClaudeV1 | ReasoningFormat::Unknown(_) => {
            if reasoning.is_none() && profile.anthropic().force_thinking {
                if max_tokens <= FORCE_THINKING_MIN_MAX_TOKENS {
                    max_tokens = FORCE_THINKING_RAISED_MAX_TOKENS;
                }
                reasoning = Some(ReasoningConfig {
                    enabled: Some(true),
                    max_tokens: Some(max_tokens - 1),
                    effort: None,
                });
            }
        }
    }

    let tools: Option<Vec<Tool>> = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter(|tool| tool.is_custom())
            .map(|tool| Tool {
                kind: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                    strict: Some(profile.options().strict),
                },
            })
            .collect()
    });
    let tools = tools.filter(|tools| !tools.is_empty());

    let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
        AnthropicToolChoice::Auto { .. } => ToolChoice::Mode(ToolChoiceMode::Auto),
        AnthropicToolChoice::None { .. } => ToolChoice::Mode(ToolChoiceMode::None),
        AnthropicToolChoice::Any { .. } => ToolChoice::Mode(ToolChoiceMode::Required),
        AnthropicToolChoice::Tool { name, .. } => ToolChoice::Function { name: name.clone() },
        AnthropicToolChoice::Unknown(_) => ToolChoice::Mode(ToolChoiceMode::Auto),
    });

    let parallel_tool_calls = request
        .tool_choice
        .as_ref()
        .and_then(|choice| choice.disable_parallel_tool_use())
        .map(|disabled| !disabled);

    let wrappers = expand_messages(request)?;
    let messages = canonicalize(wrappers, &format, profile.reasoning_delimiter());

    Ok(ChatCompletionRequest {
        model,
        messages,
        max_tokens: Some(max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        stop: request.stop_sequences.clone().map(Stop::Many),
        stream: true,
        usage: Some(UsageOptions { include: true }),
        tools,
        tool_choice,
        parallel_tool_calls,
        reasoning,
        response_format: None,
        user: request.metadata.as_ref().and_then(|metadata| metadata.user_id.clone()),
        provider: Some(ProviderPreferences::for_allowed(&profile.openrouter().allowed_providers)),
    })
}

/// One intermediate message holding a single content block, tagged with the
/// index of the Anthropic message it came from so canonicalization can merge
/// neighbors from the same source.
struct Wrapper {
    source: usize,
    message: ChatMessage,
}

fn expand_messages(request: &GenerateMessageRequest) -> Result<Vec<Wrapper>> {
    let mut wrappers = Vec::new();

    if let Some(system) = &request.system {
        let parts = system_parts(system);
        if !parts.is_empty() {
            wrappers.push(Wrapper {
                source: usize::MAX,
                message: ChatMessage {
                    role: ChatRole::System,
                    content: Some(MessageContent::Parts(parts)),
                    ..Default::default()
                },
            });
        }
    }

    for (source, message) in request.messages.iter().enumerate() {
        expand_message(source, message, &mut wrappers)?;
    }

    Ok(wrappers)
}

fn system_parts(system: &SystemPrompt) -> Vec<ContentPart> {
    let blocks = match system {
        SystemPrompt::Text(text) => {
            return vec![ContentPart::Text {
                text: text.clone(),
                cache_control: None,
            }];
        }
        SystemPrompt::Blocks(blocks) => blocks,
    };

    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(ContentPart::Text {
                text: text.text.clone(),
                cache_control: text.cache_control.clone(),
            }),
            ContentBlock::Image(image) => Some(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.source.to_data_url(),
                },
                cache_control: None,
            }),
            _ => None,
        })
        .collect()
}

fn expand_message(source: usize, message: &InputMessage, wrappers: &mut Vec<Wrapper>) -> Result<()> {
    let role = match &message.role {
        crate::protocol::anthropic::Role::User => ChatRole::User,
        crate::protocol::anthropic::Role::Assistant => ChatRole::Assistant,
        crate::protocol::anthropic::Role::Unknown(role) => ChatRole::Unknown(role.clone()),
    };

    let blocks = match &message.content {
        InputContent::Text(text) => {
            wrappers.push(Wrapper {
                source,
                message: ChatMessage {
                    role,
                    content: Some(MessageContent::Parts(vec![ContentPart::Text {
                        text: text.clone(),
                        cache_control: None,
                    }])),
                    ..Default::default()
                },
            });
            return Ok(());
        }
        InputContent::Blocks(blocks) => blocks,
    };

    for block in blocks {
        let wrapped = match block {
            ContentBlock::Text(text) => ChatMessage {
                role: role.clone(),
                content: Some(MessageContent::Parts(vec![ContentPart::Text {
                    text: text.text.clone(),
                    cache_control: text.cache_control.clone(),
                }])),
                ..Default::default()
            },
            ContentBlock::Image(image) => ChatMessage {
                role: role.clone(),
                content: Some(MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.source.to_data_url(),
                    },
                    cache_control: image.cache_control.clone(),
                }])),
                ..Default::default()
            },
            ContentBlock::Thinking(thinking) => ChatMessage {
                role: ChatRole::Assistant,
                reasoning_details: Some(vec![ReasoningDetail {
                    kind: ReasoningDetailKind::Text,
                    text: Some(thinking.thinking.clone()),
                    signature: (!thinking.signature.is_empty()).then(|| thinking.signature.clone()),
                    format: Some(REASONING_FORMAT_ANTHROPIC_CLAUDE_V1.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ContentBlock::RedactedThinking(_) => {
                return Err(Error::invalid_request(
                    "redacted_thinking content cannot be translated for this upstream",
                ));
            }
            ContentBlock::ToolUse(tool_use) => ChatMessage {
                role: ChatRole::Assistant,
                tool_calls: Some(vec![ToolCall {
                    index: None,
                    id: Some(tool_use.id.clone()),
                    kind: Some("function".to_string()),
                    function: FunctionCall {
                        name: Some(tool_use.name.clone()),
                        arguments: serde_json::to_string(&tool_use.input).unwrap_or_else(|_| "{}".to_string()),
                    },
                }]),
                ..Default::default()
            },
            ContentBlock::ToolResult(result) => ChatMessage {
                role: ChatRole::Tool,
                tool_call_id: Some(result.tool_use_id.clone()),
                content: Some(tool_result_content(result.content.as_ref())),
                ..Default::default()
            },
            // Unsupported block types are skipped, not fatal.
            ContentBlock::Unknown(_) => continue,
        };

        wrappers.push(Wrapper {
            source,
            message: wrapped,
        });
    }

    Ok(())
}

fn tool_result_content(content: Option<&ToolResultContent>) -> MessageContent {
    match content {
        None => MessageContent::Text(String::new()),
        Some(ToolResultContent::Text(text)) => MessageContent::Text(text.clone()),
        Some(ToolResultContent::Blocks(blocks)) => {
            let parts: Vec<ContentPart> = blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text(text) => Some(ContentPart::Text {
                        text: text.text.clone(),
                        cache_control: text.cache_control.clone(),
                    }),
                    ContentBlock::Image(image) => Some(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.source.to_data_url(),
                        },
                        cache_control: None,
                    }),
                    _ => None,
                })
                .collect();
            MessageContent::Parts(parts)
        }
    }
}

/// Folds the wrapper list into provider-legal messages.
///
/// Wrappers sharing a source message merge into one chat message; system and
/// tool messages pass through untouched, flushing any pending merge first.
fn canonicalize(wrappers: Vec<Wrapper>, format: &ReasoningFormat, delimiter: &str) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = Vec::new();
    let mut pending: Option<(usize, ChatMessage)> = None;

    for wrapper in wrappers {
        if matches!(wrapper.message.role, ChatRole::System | ChatRole::Tool) {
            if let Some((_, message)) = pending.take() {
                out.push(message);
            }
            out.push(wrapper.message);
            continue;
        }

        match &mut pending {
            Some((source, message)) if *source == wrapper.source => {
                merge_into(message, wrapper.message);
            }
            _ => {
                if let Some((_, message)) = pending.take() {
                    out.push(message);
                }
                pending = Some((wrapper.source, wrapper.message));
            }
        }
    }

    if let Some((_, message)) = pending.take() {
        out.push(message);
    }

    for message in &mut out {
        finalize_message(message, format, delimiter);
    }

    out
}

fn merge_into(target: &mut ChatMessage, incoming: ChatMessage) {
    if let Some(content) = incoming.content {
        match &mut target.content {
            None => target.content = Some(content),
            Some(existing) => {
                let mut parts = match std::mem::replace(existing, MessageContent::Text(String::new())) {
                    MessageContent::Parts(parts) => parts,
                    MessageContent::Text(text) => vec![ContentPart::Text {
                        text,
                        cache_control: None,
                    }],
                };
                match content {
                    MessageContent::Parts(incoming_parts) => parts.extend(incoming_parts),
                    MessageContent::Text(text) => parts.push(ContentPart::Text {
                        text,
                        cache_control: None,
                    }),
                }
                *existing = MessageContent::Parts(parts);
            }
        }
    }

    if let Some(calls) = incoming.tool_calls {
        target.tool_calls.get_or_insert_with(Vec::new).extend(calls);
    }

    if let Some(details) = incoming.reasoning_details {
        target.reasoning_details.get_or_insert_with(Vec::new).extend(details);
    }

    // First non-empty reasoning string wins.
    if target.reasoning.as_deref().unwrap_or_default().is_empty()
        && incoming.reasoning.as_deref().is_some_and(|reasoning| !reasoning.is_empty())
    {
        target.reasoning = incoming.reasoning;
    }
}

fn finalize_message(message: &mut ChatMessage, format: &ReasoningFormat, delimiter: &str) {
    // Single text parts collapse back to plain string content for roles the
    // providers expect strings from.
    if matches!(message.role, ChatRole::Assistant | ChatRole::Tool) {
        let collapsed = match &message.content {
            Some(MessageContent::Parts(parts)) if parts.len() == 1 => match &parts[0] {
                ContentPart::Text {
                    text,
                    cache_control: None,
                } => Some(text.clone()),
                _ => None,
            },
            _ => None,
        };

        if let Some(text) = collapsed {
            message.content = Some(MessageContent::Text(text));
        }
    }

    if let Some(calls) = &mut message.tool_calls {
        for (index, call) in calls.iter_mut().enumerate() {
            call.index = Some(index as u32);
        }
    }

    if let Some(details) = &mut message.reasoning_details {
        for (index, detail) in details.iter_mut().enumerate() {
            detail.index = Some(index as u32);
        }

        if !matches!(format, ReasoningFormat::AnthropicClaudeV1 | ReasoningFormat::Unknown(_)) {
            let rewritten = rewrite_reasoning_details(std::mem::take(details), format, delimiter);
            *details = rewritten;
        }
    }

    if let Some(MessageContent::Parts(parts)) = &mut message.content {
        for part in parts {
            part.strip_non_text_cache_control();
        }
    }
}

/// Reshapes reasoning details for providers that do not speak the Anthropic
/// thinking format: text moves to the provider's field and signatures become
/// separate `reasoning.encrypted` entries.
fn rewrite_reasoning_details(
    details: Vec<ReasoningDetail>,
    format: &ReasoningFormat,
    delimiter: &str,
) -> Vec<ReasoningDetail> {
    let mut out = Vec::new();
    let mut last_index = 0;

    for mut detail in details {
        let index = detail.index.unwrap_or(0);
        let signature = detail.signature.take();

        if matches!(format, ReasoningFormat::OpenaiResponsesV1) {
            detail.kind = ReasoningDetailKind::Summary;
            detail.summary = detail.text.take();
        } else {
            detail.kind = ReasoningDetailKind::Text;
        }

        let has_body = detail.text.as_deref().is_some_and(|text| !text.is_empty())
            || detail.summary.as_deref().is_some_and(|summary| !summary.is_empty());

        if has_body {
            last_index = index;
            out.push(detail.clone());
        }

        if let Some(signature) = signature.filter(|signature| !signature.is_empty()) {
            let (id, data) = match signature.split_once(delimiter) {
                Some((id, data)) => (id.to_string(), data.to_string()),
                None => (String::new(), signature),
            };

            out.push(ReasoningDetail {
                kind: ReasoningDetailKind::Encrypted,
                id: Some(id),
                data: Some(data),
                format: detail.format.clone(),
                index: Some(if has_body { index } else { last_index }),
                ..Default::default()
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use config::{ProfileConfig, Provider};
    use serde_json::{Value, json};

    use super::*;

    fn profile(configure: impl FnOnce(&mut ProfileConfig)) -> Profile {
        let mut config = ProfileConfig {
            models: vec!["*".to_string()],
            provider: Some(Provider::OpenRouter),
            ..Default::default()
        };
        configure(&mut config);
        Profile::new("test".to_string(), config)
    }

    fn request(value: Value) -> GenerateMessageRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_basic_fields() {
        let profile = profile(|config| {
            config
                .options
                .models
                .insert("claude-sonnet-4".to_string(), "anthropic/claude-sonnet-4".to_string());
            config.options.min_max_tokens = Some(1000);
        });

        let translated = translate_request(
            &request(json!({
                "model": "claude-sonnet-4",
                "max_tokens": 500,
                "temperature": 0.5,
                "top_k": 40,
                "top_p": 0.9,
                "stop_sequences": ["END"],
                "metadata": {"user_id": "user-1"},
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.model, "anthropic/claude-sonnet-4");
        assert_eq!(translated.max_tokens, Some(1000)); // raised to min_max_tokens
        assert_eq!(translated.temperature, Some(0.5));
        assert_eq!(translated.top_k, Some(40));
        assert_eq!(translated.stop, Some(Stop::Many(vec!["END".to_string()])));
        assert_eq!(translated.user.as_deref(), Some("user-1"));
        assert!(translated.stream);
        assert!(translated.usage.as_ref().unwrap().include);
    }

    #[test]
    fn maps_tool_choice_table() {
        let profile = profile(|_| {});
        let base = json!({
            "model": "m", "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}],
        });

        let cases = [
            (json!({"type": "auto"}), ToolChoice::Mode(ToolChoiceMode::Auto)),
            (json!({"type": "none"}), ToolChoice::Mode(ToolChoiceMode::None)),
            (json!({"type": "any"}), ToolChoice::Mode(ToolChoiceMode::Required)),
            (
                json!({"type": "tool", "name": "get_weather"}),
                ToolChoice::Function {
                    name: "get_weather".to_string(),
                },
            ),
        ];

        for (choice, expected) in cases {
            let mut value = base.clone();
            value["tool_choice"] = choice;
            let translated = translate_request(&request(value), &profile).unwrap();
            assert_eq!(translated.tool_choice, Some(expected));
        }
    }

    #[test]
    fn parallel_tool_calls_inverts_disable_flag() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "tool_choice": {"type": "auto", "disable_parallel_tool_use": true},
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.parallel_tool_calls, Some(false));
    }

    #[test]
    fn server_tools_are_dropped_from_translation() {
        let profile = profile(|config| config.options.strict = true);
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "tools": [
                    {"name": "get_weather", "input_schema": {"type": "object"}},
                    {"type": "web_search_20250305", "name": "web_search"},
                ],
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        let tools = translated.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "get_weather");
        assert_eq!(tools[0].function.strict, Some(true));
        assert_eq!(tools[0].function.parameters, Some(json!({"type": "object"})));
    }

    #[test]
    fn thinking_maps_to_reasoning_budget() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 4096,
                "thinking": {"type": "enabled", "budget_tokens": 2048},
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        let reasoning = translated.reasoning.unwrap();
        assert_eq!(reasoning.enabled, Some(true));
        assert_eq!(reasoning.max_tokens, Some(2048));
        assert_eq!(reasoning.effort, None);
    }

    #[test]
    fn force_thinking_raises_small_windows() {
        let profile = profile(|config| config.anthropic.force_thinking = true);
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 512,
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.max_tokens, Some(32768));
        let reasoning = translated.reasoning.unwrap();
        assert_eq!(reasoning.enabled, Some(true));
        assert_eq!(reasoning.max_tokens, Some(32767));
    }

    #[test]
    fn openai_format_strips_effort_suffix() {
        let profile = profile(|config| {
            config
                .options
                .models
                .insert("claude-opus-4".to_string(), "openai/o3:high".to_string());
            config
                .openrouter
                .model_reasoning_format
                .insert("openai/o3:high".to_string(), config::ReasoningFormat::OpenaiResponsesV1);
        });

        let translated = translate_request(
            &request(json!({
                "model": "claude-opus-4", "max_tokens": 4096,
                "thinking": {"type": "enabled", "budget_tokens": 2048},
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.model, "openai/o3");
        let reasoning = translated.reasoning.unwrap();
        assert_eq!(reasoning.max_tokens, None);
        assert_eq!(reasoning.effort.as_deref(), Some("high"));
    }

    #[test]
    fn openai_format_takes_effort_from_options() {
        let profile = profile(|config| {
            config.options.reasoning.format = Some(config::ReasoningFormat::OpenaiResponsesV1);
            config.options.reasoning.effort = Some("low".to_string());
        });

        let translated = translate_request(
            &request(json!({
                "model": "openai/gpt-5", "max_tokens": 4096,
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.model, "openai/gpt-5");
        assert_eq!(translated.reasoning.unwrap().effort.as_deref(), Some("low"));
    }

    #[test]
    fn gemini_format_forces_reasoning_on() {
        let profile = profile(|config| {
            config.options.reasoning.format = Some(config::ReasoningFormat::GoogleGeminiV1);
        });

        let translated = translate_request(
            &request(json!({
                "model": "google/gemini-2.5-pro", "max_tokens": 4096,
                "thinking": {"type": "enabled", "budget_tokens": 1024},
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        let reasoning = translated.reasoning.unwrap();
        assert_eq!(reasoning.enabled, Some(true));
        assert_eq!(reasoning.max_tokens, Some(1024));
        assert_eq!(reasoning.effort, None);
    }

    #[test]
    fn system_blocks_are_prepended_with_text_cache_control() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "system": [
                    {"type": "text", "text": "be helpful", "cache_control": {"type": "ephemeral"}},
                ],
                "messages": [{"role": "user", "content": "hi"}],
            })),
            &profile,
        )
        .unwrap();

        let system = &translated.messages[0];
        assert_eq!(system.role, ChatRole::System);
        let Some(MessageContent::Parts(parts)) = &system.content else {
            unreachable!("expected parts");
        };
        let ContentPart::Text { text, cache_control } = &parts[0] else {
            unreachable!("expected text part");
        };
        assert_eq!(text, "be helpful");
        assert!(cache_control.is_some());
    }

    #[test]
    fn blocks_of_one_message_merge_into_one_chat_message() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [
                    {"role": "user", "content": "question"},
                    {"role": "assistant", "content": [
                        {"type": "thinking", "thinking": "let me think", "signature": "sig-1"},
                        {"type": "text", "text": "I will check"},
                        {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"loc": "SF"}},
                        {"type": "tool_use", "id": "toolu_2", "name": "get_time", "input": {}},
                    ]},
                    {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "sunny"}]},
                    ]},
                ],
            })),
            &profile,
        )
        .unwrap();

        assert_eq!(translated.messages.len(), 3);

        let assistant = &translated.messages[1];
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert!(matches!(assistant.content, Some(MessageContent::Text(ref text)) if text == "I will check"));

        let details = assistant.reasoning_details.as_ref().unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].text.as_deref(), Some("let me think"));
        assert_eq!(details[0].signature.as_deref(), Some("sig-1"));
        assert_eq!(details[0].index, Some(0));

        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(calls[1].index, Some(1));
        assert_eq!(calls[1].id.as_deref(), Some("toolu_2"));

        let tool = &translated.messages[2];
        assert_eq!(tool.role, ChatRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("toolu_1"));
        assert!(matches!(tool.content, Some(MessageContent::Text(ref text)) if text == "sunny"));
    }

    #[test]
    fn tool_message_flushes_pending_merge() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [
                    {"role": "user", "content": [
                        {"type": "text", "text": "look at this"},
                        {"type": "tool_result", "tool_use_id": "toolu_1", "content": "done"},
                        {"type": "text", "text": "and this"},
                    ]},
                ],
            })),
            &profile,
        )
        .unwrap();

        // text / tool / text — the tool message splits the merge in two.
        assert_eq!(translated.messages.len(), 3);
        assert_eq!(translated.messages[0].role, ChatRole::User);
        assert_eq!(translated.messages[1].role, ChatRole::Tool);
        assert_eq!(translated.messages[2].role, ChatRole::User);
    }

    #[test]
    fn non_text_parts_lose_cache_control() {
        let profile = profile(|_| {});
        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "see image", "cache_control": {"type": "ephemeral"}},
                    {"type": "image", "cache_control": {"type": "ephemeral"},
                     "source": {"type": "base64", "media_type": "image/png", "data": "aGk="}},
                ]}],
            })),
            &profile,
        )
        .unwrap();

        let Some(MessageContent::Parts(parts)) = &translated.messages[0].content else {
            unreachable!("expected parts");
        };

        let ContentPart::Text { cache_control, .. } = &parts[0] else {
            unreachable!("expected text part");
        };
        assert!(cache_control.is_some());

        let ContentPart::ImageUrl { image_url, cache_control } = &parts[1] else {
            unreachable!("expected image part");
        };
        assert_eq!(image_url.url, "data:image/png;base64,aGk=");
        assert!(cache_control.is_none());
    }

    #[test]
    fn redacted_thinking_is_rejected() {
        let profile = profile(|_| {});
        let err = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [{"role": "assistant", "content": [
                    {"type": "redacted_thinking", "data": "opaque"},
                ]}],
            })),
            &profile,
        )
        .unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn openai_format_splits_signature_into_encrypted_detail() {
        let profile = profile(|config| {
            config.options.reasoning.format = Some(config::ReasoningFormat::OpenaiResponsesV1);
        });

        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [{"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "deep thought", "signature": "rs_123/ciphertext"},
                ]}],
            })),
            &profile,
        )
        .unwrap();

        let details = translated.messages[0].reasoning_details.as_ref().unwrap();
        assert_eq!(details.len(), 2);

        assert_eq!(details[0].kind, ReasoningDetailKind::Summary);
        assert_eq!(details[0].summary.as_deref(), Some("deep thought"));
        assert_eq!(details[0].text, None);
        assert_eq!(details[0].signature, None);

        assert_eq!(details[1].kind, ReasoningDetailKind::Encrypted);
        assert_eq!(details[1].id.as_deref(), Some("rs_123"));
        assert_eq!(details[1].data.as_deref(), Some("ciphertext"));
        assert_eq!(details[1].index, Some(0));
    }

    #[test]
    fn signature_without_delimiter_keeps_full_data() {
        let profile = profile(|config| {
            config.options.reasoning.format = Some(config::ReasoningFormat::OpenaiResponsesV1);
            config.options.reasoning.delimiter = Some("#".to_string());
        });

        let translated = translate_request(
            &request(json!({
                "model": "m", "max_tokens": 100,
                "messages": [{"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "t", "signature": "whole-signature"},
                ]}],
            })),
            &profile,
        )
        .unwrap();

        let details = translated.messages[0].reasoning_details.as_ref().unwrap();
        let encrypted = &details[1];
        assert_eq!(encrypted.id.as_deref(), Some(""));
        assert_eq!(encrypted.data.as_deref(), Some("whole-signature"));
    }

    #[test]
    fn filter_drops_disallowed_tools() {
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "tools": [
                {"name": "allowed", "input_schema": {}},
                {"name": "denied", "input_schema": {}},
            ],
            "messages": [],
        }));

        filter_disallowed_tools(&mut req, &["denied".to_string()]);

        let tools = req.tools.as_ref().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "allowed");
    }

    #[test]
    fn filter_forces_none_when_all_tools_removed() {
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "tools": [{"name": "denied", "input_schema": {}}],
            "tool_choice": {"type": "any"},
            "messages": [],
        }));

        filter_disallowed_tools(&mut req, &["denied".to_string()]);

        assert!(req.tools.is_none());
        assert!(matches!(req.tool_choice, Some(AnthropicToolChoice::None { .. })));
    }

    #[test]
    fn filter_rewrites_choice_of_removed_tool() {
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "tools": [
                {"name": "kept", "input_schema": {}},
                {"name": "denied", "input_schema": {}},
            ],
            "tool_choice": {"type": "tool", "name": "denied"},
            "messages": [],
        }));

        filter_disallowed_tools(&mut req, &["denied".to_string()]);

        assert!(matches!(req.tool_choice, Some(AnthropicToolChoice::None { .. })));
    }

    #[test]
    fn normalize_rewrites_empty_tool_results() {
        let profile = profile(|config| config.options.prevent_empty_text_tool_result = true);
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "messages": [{"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "t1"},
                {"type": "tool_result", "tool_use_id": "t2", "content": ""},
                {"type": "tool_result", "tool_use_id": "t3", "content": [{"type": "text", "text": ""}]},
            ]}],
        }));

        normalize_request(&mut req, &profile);

        let InputContent::Blocks(blocks) = &req.messages[0].content else {
            unreachable!("expected blocks");
        };

        for block in blocks {
            let ContentBlock::ToolResult(result) = block else {
                unreachable!("expected tool_result");
            };
            match result.content.as_ref().unwrap() {
                ToolResultContent::Text(text) => assert_eq!(text, EMPTY_TOOL_RESULT_TEXT),
                ToolResultContent::Blocks(nested) => {
                    let ContentBlock::Text(text) = &nested[0] else {
                        unreachable!("expected text");
                    };
                    assert_eq!(text.text, EMPTY_TOOL_RESULT_TEXT);
                }
            }
        }
    }

    #[test]
    fn normalize_strips_web_search_blocked_domains() {
        let profile = profile(|config| config.anthropic.disable_web_search_blocked_domains = true);
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "tools": [{
                "type": "web_search_20250305", "name": "web_search",
                "blocked_domains": ["example.com"],
            }],
            "messages": [],
        }));

        normalize_request(&mut req, &profile);

        let tool = &req.tools.as_ref().unwrap()[0];
        assert!(tool.unknown_fields.get("blocked_domains").is_none());
    }

    #[test]
    fn normalize_defaults_untyped_tools_to_custom() {
        let profile = profile(|_| {});
        let mut req = request(json!({
            "model": "m", "max_tokens": 100,
            "tools": [{"name": "get_weather", "input_schema": {}}],
            "messages": [],
        }));

        normalize_request(&mut req, &profile);

        assert_eq!(req.tools.as_ref().unwrap()[0].kind, Some(ToolKind::Custom));
    }
}
