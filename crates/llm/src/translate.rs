//! The bidirectional translation engine.
//!
//! [`request`] rewrites an Anthropic request into an OpenRouter one;
//! [`stream`] turns the OpenRouter chunk stream back into Anthropic events.

pub mod request;
pub mod stream;

pub use request::{filter_disallowed_tools, normalize_request, translate_request};
pub use stream::{translate_stream, StreamOptions, StreamTranslator};
