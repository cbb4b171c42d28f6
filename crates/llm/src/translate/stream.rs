use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::Error;
use crate::protocol::anthropic::{
    ContentBlock, ContentDelta, Message, MessageDelta, StopReason, StreamEvent, TextBlock, ThinkingBlock,
    ToolUseBlock, Usage,
};
use crate::protocol::openrouter::{ChatCompletionChunk, FinishReason, ToolCall, Usage as ChunkUsage};
use crate::protocol::UnknownFields;

/// Caller-supplied knobs for a translation run.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Seeds `message_start.usage.input_tokens`; without it the seed stays 0
    /// until a chunk carries usage.
    pub input_tokens_seed: Option<u64>,

    /// Multiplier applied to every emitted token count, truncating.
    pub resize_factor: f64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            input_tokens_seed: None,
            resize_factor: 1.0,
        }
    }
}

/// Which content block is currently open.
#[derive(Debug, Clone, PartialEq)]
enum OpenBlock {
    None,
    Text,
    Thinking,
    ToolUse { id: String },
}

/// Translates an OpenRouter chunk sequence into Anthropic stream events.
///
/// Emission always follows the grammar
///
/// ```text
/// message_start? (content_block_start content_block_delta* content_block_stop)* message_delta message_stop
/// ```
///
/// The translator tracks one open block at a time and a monotonic index;
/// heterogeneous deltas (text, reasoning, tool calls) close and reopen
/// blocks as the variant changes.
#[derive(Debug)]
pub struct StreamTranslator {
    options: StreamOptions,
    started: bool,
    finished: bool,
    next_index: u32,
    open: OpenBlock,
    usage: ChunkUsage,
    provider: Option<String>,
}

impl StreamTranslator {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            started: false,
            finished: false,
            next_index: 0,
            open: OpenBlock::None,
            usage: ChunkUsage::default(),
            provider: None,
        }
    }

    /// The provider slug observed on the chunk stream, if any.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// A terminal event (`message_stop` or an error) has been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stops the translation; subsequent chunks produce no events.
    pub fn abort(&mut self) {
        self.finished = true;
    }

    /// Translates one chunk into zero or more events.
    pub fn push(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if self.provider.is_none() && let Some(provider) = &chunk.provider {
            self.provider = Some(provider.clone());
        }

        if !self.started {
            self.started = true;
            events.push(self.message_start(chunk));
        }

        if let Some(usage) = &chunk.usage {
            merge_usage(&mut self.usage, usage);
        }

        if let Some(choice) = chunk.choices.first() {
            let delta = &choice.delta;

            match delta.reasoning_details.as_deref() {
                Some(details) => {
                    for detail in details {
                        let text = detail.text.as_deref().or(detail.summary.as_deref()).unwrap_or_default();
                        if !text.is_empty() {
                            self.ensure_block(&mut events, OpenBlock::Thinking);
                            events.push(StreamEvent::ContentBlockDelta {
                                index: self.current_index(),
                                delta: ContentDelta::ThinkingDelta {
                                    thinking: text.to_string(),
                                },
                            });
                        }
                        if let Some(signature) = &detail.signature
                            && !signature.is_empty()
                        {
                            self.ensure_block(&mut events, OpenBlock::Thinking);
                            events.push(StreamEvent::ContentBlockDelta {
                                index: self.current_index(),
                                delta: ContentDelta::SignatureDelta {
                                    signature: signature.clone(),
                                },
                            });
                        }
                    }
                }
                // Some providers only stream the plain reasoning field.
                None => {
                    if let Some(reasoning) = &delta.reasoning
                        && !reasoning.is_empty()
                    {
                        self.ensure_block(&mut events, OpenBlock::Thinking);
                        events.push(StreamEvent::ContentBlockDelta {
                            index: self.current_index(),
                            delta: ContentDelta::ThinkingDelta {
                                thinking: reasoning.clone(),
                            },
                        });
                    }
                }
            }

            if let Some(content) = &delta.content
                && !content.is_empty()
            {
                self.ensure_block(&mut events, OpenBlock::Text);
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.current_index(),
                    delta: ContentDelta::TextDelta { text: content.clone() },
                });
            }

            for call in delta.tool_calls.iter().flatten() {
                self.handle_tool_call(&mut events, call);
            }

            if let Some(reason) = &choice.finish_reason {
                self.close_open_block(&mut events);

                let stop_reason = map_finish_reason(reason, choice.native_finish_reason.as_deref());
                events.push(StreamEvent::MessageDelta {
                    delta: MessageDelta {
                        stop_reason: Some(stop_reason),
                        stop_sequence: None,
                        unknown_fields: UnknownFields::default(),
                    },
                    usage: Some(resize_usage(usage_from_chunk(&self.usage), self.options.resize_factor)),
                });
                events.push(StreamEvent::MessageStop);
                self.finished = true;
            }
        }

        events
    }

    fn message_start(&self, chunk: &ChatCompletionChunk) -> StreamEvent {
        let input_tokens = self
            .options
            .input_tokens_seed
            .or_else(|| chunk.usage.as_ref().map(|usage| usage.prompt_tokens))
            .unwrap_or(0);

        let usage = Usage {
            input_tokens,
            output_tokens: 1,
            ..Default::default()
        };

        StreamEvent::MessageStart {
            message: Box::new(Message {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
                usage: Some(resize_usage(usage, self.options.resize_factor)),
                ..Default::default()
            }),
        }
    }

    fn handle_tool_call(&mut self, events: &mut Vec<StreamEvent>, call: &ToolCall) {
        let call_id = call.id.as_deref().filter(|id| !id.is_empty());

        let reopen = match (&self.open, call_id) {
            (OpenBlock::ToolUse { id }, Some(new_id)) => id != new_id,
            (OpenBlock::ToolUse { .. }, None) => false,
            (_, _) => true,
        };

        if reopen {
            // A fresh block needs an id; deltas without one attach to the
            // block already open.
            let Some(id) = call_id else {
                return;
            };

            self.close_open_block(events);
            events.push(StreamEvent::ContentBlockStart {
                index: self.next_index,
                content_block: ContentBlock::ToolUse(ToolUseBlock {
                    id: id.to_string(),
                    name: call.function.name.clone().unwrap_or_default(),
                    input: Value::Object(serde_json::Map::new()),
                    cache_control: None,
                    unknown_fields: UnknownFields::default(),
                }),
            });
            self.open = OpenBlock::ToolUse { id: id.to_string() };
            self.next_index += 1;
        }

        if !call.function.arguments.is_empty() {
            events.push(StreamEvent::ContentBlockDelta {
                index: self.current_index(),
                delta: ContentDelta::InputJsonDelta {
                    partial_json: call.function.arguments.clone(),
                },
            });
        }
    }

    fn ensure_block(&mut self, events: &mut Vec<StreamEvent>, variant: OpenBlock) {
        if self.open == variant {
            return;
        }

        self.close_open_block(events);

        let content_block = match &variant {
            OpenBlock::Text => ContentBlock::Text(TextBlock::default()),
            OpenBlock::Thinking => ContentBlock::Thinking(ThinkingBlock::default()),
            // Tool blocks are opened by handle_tool_call, which knows the id.
            OpenBlock::ToolUse { .. } | OpenBlock::None => return,
        };

        events.push(StreamEvent::ContentBlockStart {
            index: self.next_index,
            content_block,
        });
        self.open = variant;
        self.next_index += 1;
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.open != OpenBlock::None {
            events.push(StreamEvent::ContentBlockStop {
                index: self.current_index(),
            });
            self.open = OpenBlock::None;
        }
    }

    /// Index of the block that is (or was just) open.
    fn current_index(&self) -> u32 {
        self.next_index.saturating_sub(1)
    }
}

/// Wraps a chunk stream into a lazy Anthropic event stream.
///
/// The input drives the output one chunk at a time; nothing is buffered. An
/// input error is forwarded as a single error item and ends the stream with
/// no synthetic `message_stop` after it.
pub fn translate_stream<S>(chunks: S, options: StreamOptions) -> impl Stream<Item = Result<StreamEvent, Error>>
where
    S: Stream<Item = Result<ChatCompletionChunk, Error>>,
{
    let mut translator = StreamTranslator::new(options);

    chunks.flat_map(move |item| {
        let out: Vec<Result<StreamEvent, Error>> = match item {
            Ok(chunk) => translator.push(&chunk).into_iter().map(Ok).collect(),
            Err(err) => {
                if translator.is_finished() {
                    Vec::new()
                } else {
                    translator.abort();
                    vec![Err(err)]
                }
            }
        };

        futures::stream::iter(out)
    })
}

fn map_finish_reason(reason: &FinishReason, native: Option<&str>) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ContentFilter => StopReason::Refusal,
        FinishReason::ToolCalls => StopReason::ToolUse,
        FinishReason::Other(_) => match native {
            Some(native) if !native.is_empty() => StopReason::Unknown(native.to_string()),
            _ => StopReason::PauseTurn,
        },
    }
}

fn merge_usage(current: &mut ChunkUsage, delta: &ChunkUsage) {
    if delta.prompt_tokens > 0 {
        current.prompt_tokens = delta.prompt_tokens;
    }
    if delta.completion_tokens > 0 {
        current.completion_tokens = delta.completion_tokens;
    }
    if delta.total_tokens > 0 {
        current.total_tokens = delta.total_tokens;
    }
    if delta.prompt_tokens_details.is_some() {
        current.prompt_tokens_details = delta.prompt_tokens_details.clone();
    }
    if delta.cache_creation_input_tokens.is_some() {
        current.cache_creation_input_tokens = delta.cache_creation_input_tokens;
    }
}

fn usage_from_chunk(usage: &ChunkUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_creation_input_tokens: usage.cache_creation_input_tokens,
        cache_read_input_tokens: usage.prompt_tokens_details.as_ref().and_then(|details| details.cached_tokens),
        ..Default::default()
    }
}

/// Multiplies every counter by `factor`, truncating to integers.
pub fn resize_usage(mut usage: Usage, factor: f64) -> Usage {
    if (factor - 1.0).abs() < f64::EPSILON {
        return usage;
    }

    let scale = |tokens: u64| (tokens as f64 * factor) as u64;

    usage.input_tokens = scale(usage.input_tokens);
    usage.output_tokens = scale(usage.output_tokens);
    usage.cache_creation_input_tokens = usage.cache_creation_input_tokens.map(scale);
    usage.cache_read_input_tokens = usage.cache_read_input_tokens.map(scale);
    usage
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use serde_json::json;

    use super::*;

    fn chunk(value: serde_json::Value) -> ChatCompletionChunk {
        serde_json::from_value(value).unwrap()
    }

    /// Checks the emission grammar: `message_start` first and exactly once,
    /// well-nested block lifecycles, `message_delta` after all blocks close,
    /// `message_stop` last.
    fn assert_grammar(events: &[StreamEvent]) {
        let mut open: Option<u32> = None;
        let mut seen_start = false;
        let mut seen_delta = false;
        let mut seen_stop = false;

        for event in events {
            assert!(!seen_stop, "no events allowed after message_stop");
            match event {
                StreamEvent::MessageStart { .. } => {
                    assert!(!seen_start, "duplicate message_start");
                    seen_start = true;
                }
                StreamEvent::ContentBlockStart { index, .. } => {
                    assert!(seen_start && !seen_delta);
                    assert_eq!(open, None, "block {index} opened while another is open");
                    open = Some(*index);
                }
                StreamEvent::ContentBlockDelta { index, .. } => {
                    assert_eq!(open, Some(*index), "delta outside an open block");
                }
                StreamEvent::ContentBlockStop { index } => {
                    assert_eq!(open, Some(*index));
                    open = None;
                }
                StreamEvent::MessageDelta { .. } => {
                    assert!(seen_start && open.is_none());
                    seen_delta = true;
                }
                StreamEvent::MessageStop => {
                    assert!(seen_delta);
                    seen_stop = true;
                }
                StreamEvent::Ping | StreamEvent::Error { .. } | StreamEvent::Unknown(_) => {}
            }
        }
        assert!(open.is_none(), "stream ended with an open block");
    }

    #[test]
    fn minimal_text_round_trip() {
        let mut translator = StreamTranslator::new(StreamOptions::default());

        let events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "claude-sonnet-4",
            "choices": [{"index": 0, "delta": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1},
        })));

        assert_grammar(&events);
        assert_eq!(events.len(), 6);

        let StreamEvent::MessageStart { message } = &events[0] else {
            unreachable!("expected message_start");
        };
        assert_eq!(message.id, "gen-1");
        assert_eq!(message.model, "claude-sonnet-4");
        let usage = message.usage.as_ref().unwrap();
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 1);

        assert!(matches!(
            &events[1],
            StreamEvent::ContentBlockStart { index: 0, content_block: ContentBlock::Text(_) }
        ));
        assert_eq!(
            events[2],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: "hello".to_string() },
            }
        );
        assert_eq!(events[3], StreamEvent::ContentBlockStop { index: 0 });

        let StreamEvent::MessageDelta { delta, usage } = &events[4] else {
            unreachable!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(usage.as_ref().unwrap().output_tokens, 1);

        assert_eq!(events[5], StreamEvent::MessageStop);
    }

    #[test]
    fn thinking_then_answer_switches_blocks() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let mut events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"reasoning_details": [
                {"type": "reasoning.text", "text": "pondering", "signature": "sig"},
            ]}}],
        })));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"content": "42"}, "finish_reason": "stop"}],
        }))));

        assert_grammar(&events);

        assert!(matches!(
            &events[1],
            StreamEvent::ContentBlockStart { index: 0, content_block: ContentBlock::Thinking(_) }
        ));
        assert_eq!(
            events[2],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::ThinkingDelta { thinking: "pondering".to_string() },
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::SignatureDelta { signature: "sig".to_string() },
            }
        );
        assert_eq!(events[4], StreamEvent::ContentBlockStop { index: 0 });
        assert!(matches!(
            &events[5],
            StreamEvent::ContentBlockStart { index: 1, content_block: ContentBlock::Text(_) }
        ));
    }

    #[test]
    fn tool_call_interleaves_after_text() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let mut events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"content": "Let me check"}}],
        })));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"tool_calls": [{
                "id": "t1", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"loc\":\"SF\"}"},
            }]}, "finish_reason": "tool_calls"}],
        }))));

        assert_grammar(&events);

        let StreamEvent::ContentBlockStart { index: 1, content_block: ContentBlock::ToolUse(tool_use) } = &events[4]
        else {
            unreachable!("expected tool_use start, got {:?}", events[4]);
        };
        assert_eq!(tool_use.id, "t1");
        assert_eq!(tool_use.name, "get_weather");

        assert_eq!(
            events[5],
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: "{\"loc\":\"SF\"}".to_string(),
                },
            }
        );

        let StreamEvent::MessageDelta { delta, .. } = &events[7] else {
            unreachable!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn new_tool_call_id_reopens_at_new_index() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let mut events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"id": "t1", "function": {"name": "a", "arguments": "{}"}},
            ]}}],
        })));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"id": "t2", "function": {"name": "b", "arguments": "{}"}},
            ]}, "finish_reason": "tool_calls"}],
        }))));

        assert_grammar(&events);

        let indices: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::ContentBlockStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, [0, 1]);
    }

    #[test]
    fn empty_deltas_emit_nothing() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {
                "content": "",
                "reasoning": "",
                "tool_calls": [{"id": "t1", "function": {"name": "a", "arguments": ""}}],
            }}],
        })));

        // message_start, tool block open, but no deltas for empty strings.
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { .. }));
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, StreamEvent::ContentBlockDelta { .. }))
        );
    }

    #[test]
    fn plain_reasoning_field_opens_thinking_block() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"reasoning": "hmm"}}],
        })));

        assert!(matches!(
            &events[1],
            StreamEvent::ContentBlockStart { content_block: ContentBlock::Thinking(_), .. }
        ));
        assert_eq!(
            events[2],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::ThinkingDelta { thinking: "hmm".to_string() },
            }
        );
    }

    #[test]
    fn input_token_seed_is_used() {
        let mut translator = StreamTranslator::new(StreamOptions {
            input_tokens_seed: Some(1234),
            resize_factor: 1.0,
        });

        let events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"content": "x"}}],
        })));

        let StreamEvent::MessageStart { message } = &events[0] else {
            unreachable!("expected message_start");
        };
        assert_eq!(message.usage.as_ref().unwrap().input_tokens, 1234);
    }

    #[test]
    fn resize_factor_scales_all_counts() {
        let mut translator = StreamTranslator::new(StreamOptions {
            input_tokens_seed: Some(100),
            resize_factor: 0.5,
        });

        let mut events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"content": "x"}}],
        })));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 101, "completion_tokens": 7},
        }))));

        let StreamEvent::MessageStart { message } = &events[0] else {
            unreachable!("expected message_start");
        };
        let start_usage = message.usage.as_ref().unwrap();
        assert_eq!(start_usage.input_tokens, 50);
        assert_eq!(start_usage.output_tokens, 0); // floor(1 * 0.5)

        let StreamEvent::MessageDelta { usage, .. } = &events[events.len() - 2] else {
            unreachable!("expected message_delta");
        };
        let usage = usage.as_ref().unwrap();
        assert_eq!(usage.input_tokens, 50); // floor(101 * 0.5)
        assert_eq!(usage.output_tokens, 3); // floor(7 * 0.5)
    }

    #[test]
    fn unknown_finish_reason_uses_native_or_pause_turn() {
        assert_eq!(
            map_finish_reason(&FinishReason::Other("eos".to_string()), Some("SAFETY")),
            StopReason::Unknown("SAFETY".to_string())
        );
        assert_eq!(
            map_finish_reason(&FinishReason::Other("eos".to_string()), None),
            StopReason::PauseTurn
        );
    }

    #[test]
    fn length_with_open_tool_use_closes_block_and_reports_max_tokens() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        let mut events = translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"id": "t1", "function": {"name": "a", "arguments": "{\"x\":"}},
            ]}}],
        })));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "m",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "length"}],
        }))));

        assert_grammar(&events);

        let StreamEvent::MessageDelta { delta, .. } = &events[events.len() - 2] else {
            unreachable!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::MaxTokens));
    }

    #[test]
    fn provider_is_captured_from_chunks() {
        let mut translator = StreamTranslator::new(StreamOptions::default());
        translator.push(&chunk(json!({
            "id": "gen-1", "model": "m", "provider": "Anthropic",
            "choices": [{"index": 0, "delta": {"content": "x"}}],
        })));

        assert_eq!(translator.provider(), Some("Anthropic"));
    }

    #[tokio::test]
    async fn stream_error_ends_without_message_stop() {
        let chunks = stream::iter(vec![
            Ok(chunk(json!({
                "id": "gen-1", "model": "m",
                "choices": [{"index": 0, "delta": {"content": "partial"}}],
            }))),
            Err(Error::api("upstream hung up")),
        ]);

        let events: Vec<_> = translate_stream(chunks, StreamOptions::default()).collect().await;

        let last = events.last().unwrap();
        assert!(last.is_err());
        assert!(
            !events
                .iter()
                .any(|item| matches!(item, Ok(StreamEvent::MessageStop)))
        );
    }

    #[test]
    fn translated_stream_assembles_into_reference_message() {
        use crate::assemble::MessageAssembler;

        let mut translator = StreamTranslator::new(StreamOptions::default());
        let mut events = Vec::new();
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "claude-sonnet-4",
            "choices": [{"index": 0, "delta": {"content": "Let me check"}}],
        }))));
        events.extend(translator.push(&chunk(json!({
            "id": "gen-1", "model": "claude-sonnet-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [{
                "id": "t1", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"loc\":\"SF\"}"},
            }]}, "finish_reason": "tool_calls"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 9},
        }))));

        let mut assembler = MessageAssembler::new();
        for event in &events {
            assembler.handle(event).unwrap();
        }
        let message = assembler.build();

        assert_eq!(message.id, "gen-1");
        assert_eq!(message.model, "claude-sonnet-4");
        assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(message.content.len(), 2);

        let ContentBlock::Text(text) = &message.content[0] else {
            unreachable!("expected text block");
        };
        assert_eq!(text.text, "Let me check");

        let ContentBlock::ToolUse(tool_use) = &message.content[1] else {
            unreachable!("expected tool_use block");
        };
        assert_eq!(tool_use.id, "t1");
        assert_eq!(tool_use.name, "get_weather");
        assert_eq!(tool_use.input, json!({"loc": "SF"}));

        let usage = message.usage.unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 10); // 1 seeded + 9 reported at finish
    }

    #[tokio::test]
    async fn lazy_stream_translates_chunk_by_chunk() {
        let chunks = stream::iter(vec![
            Ok(chunk(json!({
                "id": "gen-1", "model": "m",
                "choices": [{"index": 0, "delta": {"content": "hi"}}],
            }))),
            Ok(chunk(json!({
                "id": "gen-1", "model": "m",
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            }))),
        ]);

        let events: Vec<_> = translate_stream(chunks, StreamOptions::default())
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_grammar(&events);
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }
}
