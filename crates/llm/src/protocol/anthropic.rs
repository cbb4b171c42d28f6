//! Anthropic Messages API wire types.
//!
//! This is the protocol surface exposed to our clients; it is also spoken
//! upstream when a profile routes to an Anthropic-compatible backend.

mod content;
mod error;
mod request;
mod sse;

pub use content::{
    CacheControl, CacheControlTtl, CacheCreation, ContentBlock, ImageBlock, ImageSource, Message,
    RedactedThinkingBlock, Role, StopReason, TextBlock, ThinkingBlock, ToolResultBlock, ToolResultContent,
    ToolUseBlock, Usage,
};
pub use error::{ErrorBody, ErrorResponse};
pub use request::{
    GenerateMessageRequest, InputContent, InputMessage, Metadata, SystemPrompt, ThinkingConfig, Tool, ToolChoice,
    ToolKind,
};
pub use sse::{ContentDelta, MessageDelta, StreamEvent};
