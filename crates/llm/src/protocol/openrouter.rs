//! OpenRouter Chat Completions API wire types.

mod request;
mod response;

pub use request::{
    ChatCompletionRequest, ChatMessage, ChatRole, ContentPart, FunctionDefinition, ImageUrl, MessageContent,
    ProviderPreferences, ReasoningConfig, ReasoningDetail, ReasoningDetailKind, ResponseFormat, Stop, Tool,
    ToolChoice, ToolChoiceMode, UsageOptions, REASONING_FORMAT_ANTHROPIC_CLAUDE_V1,
};
pub use response::{
    ChatCompletion, ChatCompletionChunk, ChatMessageDelta, Choice, ChunkChoice, ErrorDetails, ErrorEnvelope,
    FinishReason, FunctionCall, PromptTokensDetails, ToolCall, Usage,
};
