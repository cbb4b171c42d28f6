//! Wire data models for the two upstream protocols.
//!
//! Every message, content block, and event is a tagged serde enum with a
//! `type` discriminator. Variants we do not model are preserved verbatim
//! through untagged `Unknown` arms and flattened [`UnknownFields`] maps so
//! pass-through traffic survives unchanged; translation rejects or skips
//! them explicitly instead of dropping them silently.

pub mod anthropic;
pub mod openrouter;
mod unknown_fields;

pub use unknown_fields::UnknownFields;
