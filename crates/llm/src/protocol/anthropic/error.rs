use serde::{Deserialize, Serialize};

use crate::protocol::UnknownFields;

/// Error envelope returned by the Messages API and by this proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `error`.
    #[serde(rename = "type", default = "error_kind")]
    pub kind: String,

    pub error: ErrorBody,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: ErrorBody) -> Self {
        Self {
            kind: error_kind(),
            error,
            request_id: None,
        }
    }
}

fn error_kind() -> String {
    "error".to_string()
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error type, e.g. `invalid_request_error` or `overloaded_error`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable explanation.
    pub message: String,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl ErrorBody {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            unknown_fields: UnknownFields::default(),
        }
    }
}
