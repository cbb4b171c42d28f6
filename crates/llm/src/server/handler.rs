use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::Event as SseFrame;
use axum::response::{IntoResponse, Response, Sse};
use config::{Profile, Provider};
use eventsource_stream::Eventsource as _;
use futures::{Stream, StreamExt};
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::AppState;
use crate::assemble::{ChatCompletionAssembler, MessageAssembler};
use crate::error::{Error, Result};
use crate::protocol::anthropic::{GenerateMessageRequest, Message, StreamEvent};
use crate::translate::stream::resize_usage;
use crate::translate::{StreamOptions, StreamTranslator, normalize_request, translate_request};
use crate::upstream;

use super::headers::{scrub_request_headers, scrub_response_headers};

pub const REQUEST_ID_HEADER: &str = "X-Cc-Request-Id";
pub const PROVIDER_HEADER: &str = "X-Provider";

const COUNT_TOKENS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STREAM_CHANNEL_CAPACITY: usize = 32;

type SseItem = std::result::Result<SseFrame, Infallible>;

/// Health probe.
pub(crate) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `POST /v1/messages`.
pub(crate) async fn messages(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = state.next_request_id();

    let response = match handle_messages(&state, &headers, query.as_deref(), body, request_id).await {
        Ok(response) => response,
        Err(error) => {
            log::error!("request {request_id} failed: {error}");
            error.into_response()
        }
    };

    with_request_id(response, request_id)
}

/// `POST /v1/messages/count_tokens` — a reverse proxy to the profile's
/// count-tokens backend.
pub(crate) async fn count_tokens(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = state.next_request_id();

    let result: Result<Response> = async {
        ensure_json_content_type(&headers)?;

        let value: serde_json::Value = serde_json::from_slice(&body)?;
        let model = value
            .get("model")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::invalid_request("count_tokens request is missing a model"))?;

        let profiles = state.profiles();
        let profile = profiles
            .find(model)
            .ok_or_else(|| Error::invalid_request(format!("no profile matches model '{model}'")))?;

        let upstream = upstream::anthropic::forward_count_tokens(&state.client, profile, &headers, body.clone()).await?;

        let status = upstream.status();
        let response_headers = scrub_response_headers(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|err| Error::api(format!("failed to read count-tokens response: {err}")))?;

        if !status.is_success() {
            return Err(Error::from_upstream(Provider::Anthropic, status.as_u16(), &bytes));
        }

        Ok((status, response_headers, provider_header(Provider::Anthropic), bytes).into_response())
    }
    .await;

    let response = match result {
        Ok(response) => response,
        Err(error) => error.into_response(),
    };

    with_request_id(response, request_id)
}

async fn handle_messages(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    query: Option<&str>,
    body: Bytes,
    request_id: u64,
) -> Result<Response> {
    ensure_json_content_type(headers)?;

    let mut request: GenerateMessageRequest = serde_json::from_slice(&body)?;
    log_request_body(request_id, &body);

    let profiles = state.profiles();
    let profile = profiles
        .find(&request.model)
        .ok_or_else(|| Error::invalid_request(format!("no profile matches model '{}'", request.model)))?;

    normalize_request(&mut request, profile);

    let provider = select_provider(&request, profile);
    let ctx = SnapshotContext::new(state, profile, provider, &request, headers, request_id);

    match provider {
        Provider::Anthropic => dispatch_anthropic(state, profile, &request, headers, query, body, ctx).await,
        Provider::OpenRouter => dispatch_openrouter(state, profile, &request, headers, ctx).await,
    }
}

/// Server-managed tools only exist on the Anthropic side; their presence
/// overrides the profile's provider choice.
fn select_provider(request: &GenerateMessageRequest, profile: &Profile) -> Provider {
    if request.has_server_tool() {
        Provider::Anthropic
    } else {
        profile.provider()
    }
}

fn ensure_json_content_type(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        Ok(())
    } else {
        Err(Error::invalid_request(format!(
            "unsupported content type '{content_type}', expected application/json"
        )))
    }
}

fn log_request_body(request_id: u64, body: &Bytes) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    match serde_json::from_slice::<serde_json::Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
    {
        Ok(pretty) => log::debug!("request {request_id} body:\n{pretty}"),
        Err(_) => log::debug!("request {request_id} body is not valid JSON"),
    }
}

fn with_request_id(mut response: Response, request_id: u64) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn provider_header(provider: Provider) -> [(&'static str, &'static str); 1] {
    [(PROVIDER_HEADER, provider.as_str())]
}

fn sse_frame(event: &StreamEvent) -> SseFrame {
    let data = serde_json::to_string(event).unwrap_or_else(|err| {
        log::error!("failed to serialize stream event: {err}");
        r#"{"type":"error","error":{"type":"api_error","message":"serialization failed"}}"#.to_string()
    });

    SseFrame::default().event(event.name()).data(data)
}

fn raw_frame(raw: &eventsource_stream::Event) -> SseFrame {
    let mut frame = SseFrame::default().data(raw.data.clone());
    if !raw.event.is_empty() {
        frame = frame.event(raw.event.clone());
    }
    frame
}

fn error_frame(error: &Error) -> SseFrame {
    let data = serde_json::to_string(&error.to_response_body()).unwrap_or_else(|_| {
        r#"{"type":"error","error":{"type":"api_error","message":"serialization failed"}}"#.to_string()
    });

    SseFrame::default().event("error").data(data)
}

/// Everything needed to archive the exchange once it finishes, detached from
/// the request borrow so stream pumps can own it.
struct SnapshotContext {
    recorder: Option<snapshot::Recorder>,
    request_time: Timestamp,
    version: String,
    request_id: u64,
    provider: Provider,
    profile: String,
    config: serde_json::Value,
    anthropic_request: serde_json::Value,
    request_header: serde_json::Value,
}

impl SnapshotContext {
    fn new(
        state: &Arc<AppState>,
        profile: &Profile,
        provider: Provider,
        request: &GenerateMessageRequest,
        headers: &HeaderMap,
        request_id: u64,
    ) -> Self {
        Self {
            recorder: state.snapshot.clone(),
            request_time: Timestamp::now(),
            version: state.version.clone(),
            request_id,
            provider,
            profile: profile.name().to_string(),
            config: profile.redacted_config(),
            anthropic_request: serde_json::to_value(request).unwrap_or_default(),
            // Credentials never reach the sink; archive the scrubbed view.
            request_header: snapshot::collapse_headers(&scrub_request_headers(headers)),
        }
    }

    async fn record(
        self,
        status_code: u16,
        anthropic_response: serde_json::Value,
        openrouter_request: Option<serde_json::Value>,
        openrouter_response: Option<serde_json::Value>,
        response_header: serde_json::Value,
        error: Option<&Error>,
    ) {
        let Some(recorder) = &self.recorder else {
            return;
        };

        let record = snapshot::Record {
            request_time: self.request_time,
            finish_time: Timestamp::now(),
            version: self.version,
            request_id: self.request_id,
            status_code,
            provider: self.provider.as_str().to_string(),
            profile: self.profile,
            config: self.config,
            error: error.map(|error| serde_json::to_value(error.to_response_body()).unwrap_or_default()),
            anthropic_request: self.anthropic_request,
            anthropic_response,
            openrouter_request,
            openrouter_response,
            request_header: self.request_header,
            response_header,
        };

        if let Err(err) = recorder.record(record).await {
            log::warn!("dropping snapshot for request {}: {err}", self.request_id);
        }
    }
}

async fn dispatch_anthropic(
    state: &Arc<AppState>,
    profile: &Profile,
    request: &GenerateMessageRequest,
    headers: &HeaderMap,
    query: Option<&str>,
    raw_body: Bytes,
    ctx: SnapshotContext,
) -> Result<Response> {
    let body = if profile.anthropic().use_raw_request_body {
        raw_body
    } else {
        Bytes::from(serde_json::to_vec(request).map_err(|err| Error::api(format!("failed to serialize request: {err}")))?)
    };

    let upstream = upstream::anthropic::forward(&state.client, profile, headers, query, body).await?;

    let status = upstream.status();
    let response_headers = scrub_response_headers(upstream.headers());

    if !status.is_success() {
        let bytes = upstream.bytes().await.unwrap_or_default();
        let error = Error::from_upstream(Provider::Anthropic, status.as_u16(), &bytes);
        ctx.record(
            status.as_u16(),
            serde_json::Value::Null,
            None,
            None,
            snapshot::collapse_headers(&response_headers),
            Some(&error),
        )
        .await;
        return Err(error);
    }

    let is_event_stream = response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));

    if is_event_stream {
        let (tx, rx) = mpsc::channel::<SseItem>(STREAM_CHANNEL_CAPACITY);

        let events = upstream.bytes_stream().eventsource();
        let resize_factor = profile.context_window_resize_factor();
        let pass_through = profile.anthropic().enable_pass_through_mode;
        let recorded_headers = snapshot::collapse_headers(&response_headers);

        tokio::spawn(pump_anthropic_stream(
            events,
            tx,
            resize_factor,
            pass_through,
            ctx,
            recorded_headers,
        ));

        let mut response = Sse::new(ReceiverStream::new(rx)).into_response();
        merge_response_headers(&mut response, &response_headers);
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static(Provider::Anthropic.as_str()));
        Ok(response)
    } else {
        let bytes = upstream
            .bytes()
            .await
            .map_err(|err| Error::api(format!("failed to read upstream response: {err}")))?;

        // Snapshot parse failures stay invisible to the client: the upstream
        // answered and the body is forwarded verbatim either way.
        let anthropic_response = match serde_json::from_slice::<Message>(&bytes) {
            Ok(message) => serde_json::to_value(&message).unwrap_or_default(),
            Err(err) => {
                log::warn!("pass-through body does not parse as a message: {err}");
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        };

        ctx.record(
            status.as_u16(),
            anthropic_response,
            None,
            None,
            snapshot::collapse_headers(&response_headers),
            None,
        )
        .await;

        Ok((status, response_headers, provider_header(Provider::Anthropic), bytes).into_response())
    }
}

async fn pump_anthropic_stream<S, E>(
    events: S,
    tx: mpsc::Sender<SseItem>,
    resize_factor: f64,
    pass_through: bool,
    ctx: SnapshotContext,
    response_header: serde_json::Value,
) where
    S: Stream<Item = std::result::Result<eventsource_stream::Event, eventsource_stream::EventStreamError<E>>>,
    E: std::fmt::Display,
{
    let mut assembler = MessageAssembler::new();
    let mut client_gone = false;
    let mut stream_error: Option<Error> = None;

    futures::pin_mut!(events);

    while let Some(item) = events.next().await {
        let raw = match item {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("Anthropic stream transport error: {err}");
                let error = Error::api("the Anthropic stream ended unexpectedly").from_provider(Provider::Anthropic);
                if !client_gone {
                    let _ = tx.send(Ok(error_frame(&error))).await;
                }
                stream_error = Some(error);
                break;
            }
        };

        let frame = match serde_json::from_str::<StreamEvent>(&raw.data) {
            Ok(mut event) => {
                apply_resize(&mut event, resize_factor);
                if let Err(err) = assembler.handle(&event) {
                    log::warn!("snapshot assembly skipped an event: {err}");
                }
                if pass_through {
                    // Forward the upstream frame untouched.
                    raw_frame(&raw)
                } else {
                    sse_frame(&event)
                }
            }
            Err(err) => {
                log::warn!("failed to parse Anthropic stream event: {err}");
                raw_frame(&raw)
            }
        };

        if !client_gone && tx.send(Ok(frame)).await.is_err() {
            // Client disconnected; keep draining the upstream so the
            // connection winds down cleanly and the snapshot is complete.
            client_gone = true;
        }
    }

    ctx.record(
        StatusCode::OK.as_u16(),
        serde_json::to_value(assembler.build()).unwrap_or_default(),
        None,
        None,
        response_header,
        stream_error.as_ref(),
    )
    .await;
}

async fn dispatch_openrouter(
    state: &Arc<AppState>,
    profile: &Profile,
    request: &GenerateMessageRequest,
    headers: &HeaderMap,
    ctx: SnapshotContext,
) -> Result<Response> {
    let translated = translate_request(request, profile)?;
    let translated_value = serde_json::to_value(&translated).ok();

    let input_tokens_seed = if profile.options().disable_count_tokens_request {
        None
    } else {
        probe_count_tokens(state, profile, request, headers).await
    };

    let chunks = match upstream::openrouter::chat_completion_stream(&state.client, profile, &translated).await {
        Ok(chunks) => chunks,
        Err(error) => {
            ctx.record(
                error.kind.status().as_u16(),
                serde_json::Value::Null,
                translated_value,
                None,
                serde_json::Value::Object(serde_json::Map::new()),
                Some(&error),
            )
            .await;
            return Err(error);
        }
    };

    let options = StreamOptions {
        input_tokens_seed,
        resize_factor: profile.context_window_resize_factor(),
    };

    if request.stream.unwrap_or(false) {
        let (tx, rx) = mpsc::channel::<SseItem>(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(pump_openrouter_stream(chunks, tx, options, ctx, translated_value));

        let mut response = Sse::new(ReceiverStream::new(rx)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static(Provider::OpenRouter.as_str()));
        Ok(response)
    } else {
        let mut translator = StreamTranslator::new(options);
        let mut chat_assembler = ChatCompletionAssembler::new();
        let mut assembler = MessageAssembler::new();

        futures::pin_mut!(chunks);

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    chat_assembler.push(&chunk);
                    for event in translator.push(&chunk) {
                        if let Err(err) = assembler.handle(&event) {
                            log::warn!("assembly skipped an event: {err}");
                        }
                    }
                }
                Err(error) => {
                    ctx.record(
                        error.kind.status().as_u16(),
                        serde_json::Value::Null,
                        translated_value.clone(),
                        serde_json::to_value(chat_assembler.build()).ok(),
                        serde_json::Value::Object(serde_json::Map::new()),
                        Some(&error),
                    )
                    .await;
                    return Err(error);
                }
            }
        }

        let message = assembler.build();

        if log::log_enabled!(log::Level::Debug)
            && let Ok(pretty) = serde_json::to_string_pretty(&message)
        {
            log::debug!("assembled response:\n{pretty}");
        }

        let mut response_headers = HeaderMap::new();
        response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        ctx.record(
            StatusCode::OK.as_u16(),
            serde_json::to_value(&message).unwrap_or_default(),
            translated_value,
            serde_json::to_value(chat_assembler.build()).ok(),
            snapshot::collapse_headers(&response_headers),
            None,
        )
        .await;

        Ok((StatusCode::OK, provider_header(Provider::OpenRouter), Json(message)).into_response())
    }
}

async fn probe_count_tokens(
    state: &Arc<AppState>,
    profile: &Profile,
    request: &GenerateMessageRequest,
    headers: &HeaderMap,
) -> Option<u64> {
    let probe = upstream::anthropic::count_tokens(&state.client, profile, request, headers);

    match tokio::time::timeout(COUNT_TOKENS_PROBE_TIMEOUT, probe).await {
        Ok(Ok(tokens)) => Some(tokens),
        Ok(Err(err)) => {
            log::warn!("count-tokens probe failed, seeding input_tokens with 0: {err}");
            None
        }
        Err(_) => {
            log::warn!("count-tokens probe timed out, seeding input_tokens with 0");
            None
        }
    }
}

async fn pump_openrouter_stream(
    chunks: upstream::openrouter::ChunkStream,
    tx: mpsc::Sender<SseItem>,
    options: StreamOptions,
    ctx: SnapshotContext,
    translated_value: Option<serde_json::Value>,
) {
    let mut translator = StreamTranslator::new(options);
    let mut chat_assembler = ChatCompletionAssembler::new();
    let mut assembler = MessageAssembler::new();
    let mut client_gone = false;
    let mut stream_error: Option<Error> = None;

    futures::pin_mut!(chunks);

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                chat_assembler.push(&chunk);
                for event in translator.push(&chunk) {
                    if let Err(err) = assembler.handle(&event) {
                        log::warn!("assembly skipped an event: {err}");
                    }
                    if !client_gone && tx.send(Ok(sse_frame(&event))).await.is_err() {
                        // Client disconnected; drain the upstream instead of
                        // abandoning the connection mid-stream.
                        client_gone = true;
                    }
                }
            }
            Err(error) => {
                if !client_gone {
                    let _ = tx.send(Ok(error_frame(&error))).await;
                }
                stream_error = Some(error);
                break;
            }
        }
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));

    ctx.record(
        StatusCode::OK.as_u16(),
        serde_json::to_value(assembler.build()).unwrap_or_default(),
        translated_value,
        serde_json::to_value(chat_assembler.build()).ok(),
        snapshot::collapse_headers(&response_headers),
        stream_error.as_ref(),
    )
    .await;
}

fn apply_resize(event: &mut StreamEvent, factor: f64) {
    if (factor - 1.0).abs() < f64::EPSILON {
        return;
    }

    match event {
        StreamEvent::MessageStart { message } => {
            message.usage = message.usage.take().map(|usage| resize_usage(usage, factor));
        }
        StreamEvent::MessageDelta { usage, .. } => {
            *usage = usage.take().map(|current| resize_usage(current, factor));
        }
        _ => {}
    }
}

fn merge_response_headers(response: &mut Response, upstream: &HeaderMap) {
    for (name, value) in upstream {
        if name == header::CONTENT_TYPE {
            continue;
        }
        response.headers_mut().append(name, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use config::ProfileConfig;
    use http::HeaderValue;
    use serde_json::json;

    use super::*;

    fn profile(provider: Provider) -> Profile {
        Profile::new(
            "test".to_string(),
            ProfileConfig {
                models: vec!["*".to_string()],
                provider: Some(provider),
                ..Default::default()
            },
        )
    }

    fn request(value: serde_json::Value) -> GenerateMessageRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn server_tool_forces_anthropic_upstream() {
        let request = request(json!({
            "model": "claude-sonnet-4", "max_tokens": 100,
            "tools": [{"type": "web_search_20250305", "name": "web_search"}],
            "messages": [],
        }));

        assert_eq!(select_provider(&request, &profile(Provider::OpenRouter)), Provider::Anthropic);
    }

    #[test]
    fn custom_tools_follow_the_profile_provider() {
        let request = request(json!({
            "model": "claude-sonnet-4", "max_tokens": 100,
            "tools": [{"name": "get_weather", "input_schema": {}}],
            "messages": [],
        }));

        assert_eq!(select_provider(&request, &profile(Provider::OpenRouter)), Provider::OpenRouter);
        assert_eq!(select_provider(&request, &profile(Provider::Anthropic)), Provider::Anthropic);
    }

    #[test]
    fn content_type_must_be_json() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(ensure_json_content_type(&headers).is_ok());

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(ensure_json_content_type(&headers).is_err());

        assert!(ensure_json_content_type(&HeaderMap::new()).is_err());
    }
}
