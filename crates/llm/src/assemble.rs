//! Fold streamed deltas back into whole response bodies.
//!
//! Both assemblers run beside streaming: the dispatcher tees events and
//! chunks into them so non-stream responses and snapshots get an archivable
//! whole without a second upstream call.

mod chat;
mod message;

pub use chat::ChatCompletionAssembler;
pub use message::{AssembleError, MessageAssembler};
