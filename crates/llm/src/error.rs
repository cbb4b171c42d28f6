use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use config::Provider;
use thiserror::Error;

use crate::protocol::{
    anthropic::{ErrorBody, ErrorResponse},
    openrouter,
};

pub type Result<T> = std::result::Result<T, Error>;

pub const RETRY_AFTER: &str = "Retry-After";
pub const X_RETRY_AFTER: &str = "X-Retry-After";
pub const X_SHOULD_RETRY: &str = "X-Should-Retry";

/// Error classification shared across the proxy.
///
/// Every failure that can reach a client is carried as one of these kinds;
/// the dispatcher is the only place that turns them into HTTP responses or
/// SSE error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RequestTooLarge,
    RateLimit,
    Api,
    Overloaded,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Permission => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Api => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Overloaded => StatusCode::from_u16(529).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Error type string used in the Anthropic-shaped envelope.
    pub fn wire_type(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request_error",
            Self::Authentication => "authentication_error",
            Self::Permission => "permission_error",
            Self::NotFound => "not_found_error",
            Self::RequestTooLarge => "request_too_large_error",
            Self::RateLimit => "rate_limit_error",
            Self::Api => "api_error",
            Self::Overloaded => "overloaded_error",
        }
    }

    /// Suggested retry delay in seconds, when the failure is retryable.
    pub fn retry_after_seconds(self) -> Option<u64> {
        match self {
            Self::RateLimit => Some(seconds_until_next_minute()),
            Self::Api => Some(1),
            Self::Overloaded => Some(10),
            _ => None,
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::Permission,
            404 => Self::NotFound,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimit,
            529 => Self::Overloaded,
            _ => Self::Api,
        }
    }
}

fn seconds_until_next_minute() -> u64 {
    let second = jiff::Timestamp::now().as_second().rem_euclid(60) as u64;
    60 - second
}

/// A classified failure with its upstream of origin, if any.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Which upstream produced this error; `None` for local failures.
    pub source_provider: Option<Provider>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_provider: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn from_provider(mut self, provider: Provider) -> Self {
        self.source_provider = Some(provider);
        self
    }

    /// Classifies a non-success upstream response body.
    ///
    /// Both the Anthropic and the OpenRouter error shapes are recognized;
    /// anything else is surfaced with the raw body as the message.
    pub fn from_upstream(provider: Provider, status: u16, body: &[u8]) -> Self {
        let kind = ErrorKind::from_status(status);

        let message = if let Ok(envelope) = serde_json::from_slice::<ErrorResponse>(body) {
            envelope.error.message
        } else if let Ok(envelope) = serde_json::from_slice::<openrouter::ErrorEnvelope>(body) {
            envelope.error.message
        } else {
            String::from_utf8_lossy(body).into_owned()
        };

        let message = if message.is_empty() {
            format!("upstream returned status {status}")
        } else {
            message
        };

        Self {
            kind,
            message,
            source_provider: Some(provider),
        }
    }

    /// The wire envelope for this error.
    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse::new(ErrorBody::new(self.kind.wire_type(), self.message.clone()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_request(format!("invalid JSON: {err}"))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let mut response = (status, Json(self.to_response_body())).into_response();

        if let Some(seconds) = self.kind.retry_after_seconds()
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, value.clone());
            headers.insert(X_RETRY_AFTER, value);
            headers.insert(X_SHOULD_RETRY, HeaderValue::from_static("true"));
        }

        if let Some(provider) = self.source_provider {
            response
                .headers_mut()
                .insert("X-Provider", HeaderValue::from_static(provider.as_str()));
        }

        response
    }
}
