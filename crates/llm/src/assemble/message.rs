use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::anthropic::{ContentBlock, ContentDelta, Message, StreamEvent, Usage};

/// Errors produced while folding an event stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    /// A block event referenced an index that is not currently open or does
    /// not continue the sequence.
    #[error("content block index {0} is out of order")]
    OutOfOrderIndex(u32),

    /// A delta does not fit the block it addresses (e.g. `text_delta` on a
    /// tool_use block).
    #[error("delta does not match the open block at index {0}")]
    DeltaMismatch(u32),
}

/// Folds an Anthropic event stream into a whole [`Message`].
///
/// Feeding no events and calling [`MessageAssembler::build`] yields an empty
/// message; `build` is idempotent and may be called repeatedly.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    message: Message,
    open: Option<u32>,
    /// Accumulated `input_json_delta` payloads per tool_use block index.
    partial_inputs: HashMap<u32, String>,
    stopped: bool,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event to the fold.
    pub fn handle(&mut self, event: &StreamEvent) -> Result<(), AssembleError> {
        if self.stopped {
            return Ok(());
        }

        match event {
            StreamEvent::MessageStart { message } => {
                self.message = (**message).clone();
                Ok(())
            }
            StreamEvent::ContentBlockStart { index, content_block } => self.start_block(*index, content_block),
            StreamEvent::ContentBlockDelta { index, delta } => self.apply_delta(*index, delta),
            StreamEvent::ContentBlockStop { index } => self.stop_block(*index),
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.message.stop_reason = delta.stop_reason.clone();
                }
                if delta.stop_sequence.is_some() {
                    self.message.stop_sequence = delta.stop_sequence.clone();
                }
                if let Some(usage) = usage {
                    merge_usage(self.message.usage.get_or_insert_with(Usage::default), usage);
                }
                Ok(())
            }
            StreamEvent::MessageStop => {
                self.stopped = true;
                Ok(())
            }
            // Errors terminate the stream at the dispatcher, pings carry
            // nothing, and unknown events have no defined fold semantics.
            StreamEvent::Ping | StreamEvent::Error { .. } | StreamEvent::Unknown(_) => Ok(()),
        }
    }

    fn start_block(&mut self, index: u32, block: &ContentBlock) -> Result<(), AssembleError> {
        if self.open.is_some() || index as usize != self.message.content.len() {
            return Err(AssembleError::OutOfOrderIndex(index));
        }

        if matches!(block, ContentBlock::ToolUse(_)) {
            self.partial_inputs.insert(index, String::new());
        }

        self.message.content.push(block.clone());
        self.open = Some(index);
        Ok(())
    }

    fn apply_delta(&mut self, index: u32, delta: &ContentDelta) -> Result<(), AssembleError> {
        if self.open != Some(index) {
            return Err(AssembleError::OutOfOrderIndex(index));
        }

        let block = self
            .message
            .content
            .get_mut(index as usize)
            .ok_or(AssembleError::OutOfOrderIndex(index))?;

        match (block, delta) {
            (ContentBlock::Text(text), ContentDelta::TextDelta { text: fragment }) => {
                text.text.push_str(fragment);
                Ok(())
            }
            (ContentBlock::Thinking(thinking), ContentDelta::ThinkingDelta { thinking: fragment }) => {
                thinking.thinking.push_str(fragment);
                Ok(())
            }
            (ContentBlock::Thinking(thinking), ContentDelta::SignatureDelta { signature }) => {
                thinking.signature.push_str(signature);
                Ok(())
            }
            (ContentBlock::ToolUse(_), ContentDelta::InputJsonDelta { partial_json }) => {
                self.partial_inputs.entry(index).or_default().push_str(partial_json);
                Ok(())
            }
            (_, ContentDelta::Unknown(_)) => Ok(()),
            _ => Err(AssembleError::DeltaMismatch(index)),
        }
    }

    fn stop_block(&mut self, index: u32) -> Result<(), AssembleError> {
        if self.open != Some(index) {
            return Err(AssembleError::OutOfOrderIndex(index));
        }

        self.open = None;

        if let Some(buffer) = self.partial_inputs.remove(&index)
            && let Some(ContentBlock::ToolUse(tool_use)) = self.message.content.get_mut(index as usize)
        {
            tool_use.input = parse_tool_input(&buffer);
        }

        Ok(())
    }

    /// Returns the assembled message so far.
    pub fn build(&self) -> Message {
        let mut message = self.message.clone();

        // A stream cut off mid-block leaves unparsed input buffers behind.
        for (index, buffer) in &self.partial_inputs {
            if let Some(ContentBlock::ToolUse(tool_use)) = message.content.get_mut(*index as usize) {
                tool_use.input = parse_tool_input(buffer);
            }
        }

        message
    }
}

fn parse_tool_input(buffer: &str) -> serde_json::Value {
    if buffer.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }

    match serde_json::from_str(buffer) {
        Ok(value) => value,
        Err(err) => {
            // Truncated argument JSON happens when generation hits max_tokens
            // mid tool call; keep the raw bytes rather than dropping them.
            log::warn!("tool input is not valid JSON ({err}), keeping raw text");
            serde_json::Value::String(buffer.to_string())
        }
    }
}

fn merge_usage(current: &mut Usage, delta: &Usage) {
    // Output counters accumulate; input counters are authoritative snapshots.
    current.output_tokens += delta.output_tokens;
    if delta.input_tokens > 0 {
        current.input_tokens = delta.input_tokens;
    }
    if delta.cache_creation_input_tokens.is_some() {
        current.cache_creation_input_tokens = delta.cache_creation_input_tokens;
    }
    if delta.cache_read_input_tokens.is_some() {
        current.cache_read_input_tokens = delta.cache_read_input_tokens;
    }
    if delta.cache_creation.is_some() {
        current.cache_creation = delta.cache_creation.clone();
    }
}
