//! The request dispatcher: HTTP handlers, SSE emission, snapshot capture.

pub mod headers;
pub(crate) mod handler;
