use std::collections::BTreeMap;

use crate::protocol::openrouter::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ChatRole, Choice, FinishReason, MessageContent,
    ReasoningDetail, ToolCall, Usage,
};

/// Folds streamed chunks into a non-stream [`ChatCompletion`].
///
/// Used for snapshots and for non-stream pass-through, where the upstream is
/// always driven in streaming mode but the caller needs one whole body.
#[derive(Debug, Default)]
pub struct ChatCompletionAssembler {
    id: String,
    provider: Option<String>,
    model: String,
    object: String,
    created: i64,
    choices: BTreeMap<u32, ChoiceAssembler>,
    usage: Option<Usage>,
}

#[derive(Debug, Default)]
struct ChoiceAssembler {
    role: Option<ChatRole>,
    content: Option<String>,
    refusal: Option<String>,
    reasoning: Option<String>,
    reasoning_details: BTreeMap<u32, ReasoningDetail>,
    tool_calls: BTreeMap<u32, ToolCall>,
    finish_reason: Option<FinishReason>,
    native_finish_reason: Option<String>,
}

impl ChatCompletionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one chunk to the fold.
    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        if self.id.is_empty() {
            self.id = chunk.id.clone();
        }
        if self.provider.is_none() {
            self.provider = chunk.provider.clone();
        }
        if self.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if self.object.is_empty() && !chunk.object.is_empty() {
            self.object = chunk.object.clone();
        }
        if self.created == 0 {
            self.created = chunk.created;
        }

        if let Some(usage) = &chunk.usage {
            match &mut self.usage {
                None => self.usage = Some(usage.clone()),
                Some(current) => {
                    if usage.prompt_tokens > 0 {
                        current.prompt_tokens = usage.prompt_tokens;
                    }
                    if usage.completion_tokens > 0 {
                        current.completion_tokens = usage.completion_tokens;
                    }
                    if usage.total_tokens > 0 {
                        current.total_tokens = usage.total_tokens;
                    }
                    if usage.prompt_tokens_details.is_some() {
                        current.prompt_tokens_details = usage.prompt_tokens_details.clone();
                    }
                    if usage.cache_creation_input_tokens.is_some() {
                        current.cache_creation_input_tokens = usage.cache_creation_input_tokens;
                    }
                }
            }
        }

        for chunk_choice in &chunk.choices {
            let choice = self.choices.entry(chunk_choice.index).or_default();

            if choice.role.is_none() {
                choice.role = chunk_choice.delta.role.clone();
            }
            if let Some(content) = &chunk_choice.delta.content {
                choice.content.get_or_insert_with(String::new).push_str(content);
            }
            if let Some(refusal) = &chunk_choice.delta.refusal {
                choice.refusal.get_or_insert_with(String::new).push_str(refusal);
            }
            if let Some(reasoning) = &chunk_choice.delta.reasoning {
                choice.reasoning.get_or_insert_with(String::new).push_str(reasoning);
            }

            for (position, detail) in chunk_choice.delta.reasoning_details.iter().flatten().enumerate() {
                let index = detail.index.unwrap_or(position as u32);
                match choice.reasoning_details.get_mut(&index) {
                    None => {
                        choice.reasoning_details.insert(index, detail.clone());
                    }
                    Some(existing) => {
                        if let Some(text) = &detail.text {
                            existing.text.get_or_insert_with(String::new).push_str(text);
                        }
                        if existing.signature.is_none() {
                            existing.signature = detail.signature.clone();
                        }
                    }
                }
            }

            for (position, call) in chunk_choice.delta.tool_calls.iter().flatten().enumerate() {
                let index = call.index.unwrap_or(position as u32);
                match choice.tool_calls.get_mut(&index) {
                    None => {
                        choice.tool_calls.insert(index, call.clone());
                    }
                    Some(existing) => {
                        if existing.id.is_none() {
                            existing.id = call.id.clone();
                        }
                        if existing.function.name.is_none() {
                            existing.function.name = call.function.name.clone();
                        }
                        existing.function.arguments.push_str(&call.function.arguments);
                    }
                }
            }

            if choice.finish_reason.is_none() {
                choice.finish_reason = chunk_choice.finish_reason.clone();
            }
            if choice.native_finish_reason.is_none() {
                choice.native_finish_reason = chunk_choice.native_finish_reason.clone();
            }
        }
    }

    /// Returns the completion assembled so far.
    pub fn build(&self) -> ChatCompletion {
        let choices = self
            .choices
            .iter()
            .map(|(index, choice)| {
                let reasoning_details: Vec<_> = choice.reasoning_details.values().cloned().collect();
                let tool_calls: Vec<_> = choice.tool_calls.values().cloned().collect();

                Choice {
                    index: *index,
                    message: ChatMessage {
                        role: choice.role.clone().unwrap_or(ChatRole::Assistant),
                        content: choice.content.clone().map(MessageContent::Text),
                        refusal: choice.refusal.clone(),
                        reasoning: choice.reasoning.clone(),
                        reasoning_details: (!reasoning_details.is_empty()).then_some(reasoning_details),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    },
                    finish_reason: choice.finish_reason.clone(),
                    native_finish_reason: choice.native_finish_reason.clone(),
                }
            })
            .collect();

        let usage = self.usage.clone().map(|mut usage| {
            if usage.total_tokens == 0 {
                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
            }
            usage
        });

        ChatCompletion {
            id: self.id.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            object: if self.object.is_empty() {
                "chat.completion".to_string()
            } else {
                self.object.clone()
            },
            created: self.created,
            choices,
            usage,
        }
    }
}
