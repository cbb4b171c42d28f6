use axum::body::Bytes;
use config::{Profile, Provider};
use http::HeaderMap;
use secrecy::ExposeSecret as _;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::protocol::anthropic::GenerateMessageRequest;
use crate::server::headers::scrub_request_headers;

const API_KEY_HEADER: &str = "x-api-key";
const VERSION_HEADER: &str = "anthropic-version";

/// Forwards a messages request to the profile's Anthropic upstream.
///
/// The response is returned regardless of status; the dispatcher decides how
/// to surface upstream failures.
pub async fn forward(
    client: &reqwest::Client,
    profile: &Profile,
    incoming: &HeaderMap,
    query: Option<&str>,
    body: Bytes,
) -> Result<reqwest::Response> {
    let mut url = format!("{}/v1/messages?beta=true", profile.anthropic_base_url().trim_end_matches('/'));
    if let Some(query) = query
        && !query.is_empty()
    {
        url.push('&');
        url.push_str(query);
    }

    let mut builder = client.post(url);
    builder = apply_headers(builder, profile, incoming);

    builder
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|err| {
            log::error!("failed to reach Anthropic upstream: {err}");
            Error::api("could not connect to the Anthropic upstream").from_provider(Provider::Anthropic)
        })
}

/// Reverse-proxies a count-tokens request to the profile's backend.
pub async fn forward_count_tokens(
    client: &reqwest::Client,
    profile: &Profile,
    incoming: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response> {
    let url = format!(
        "{}/v1/messages/count_tokens",
        profile.count_tokens_backend().trim_end_matches('/')
    );

    let mut builder = client.post(url);
    builder = apply_headers(builder, profile, incoming);

    builder
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|err| {
            log::error!("failed to reach count-tokens backend: {err}");
            Error::api("could not connect to the count-tokens backend").from_provider(Provider::Anthropic)
        })
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

/// Asks the count-tokens backend for the request's input token count.
///
/// Used to seed `message_start.usage.input_tokens` when the serving upstream
/// cannot report prompt tokens before the stream ends. The incoming headers
/// ride along so a profile without its own Anthropic key still authenticates
/// with the client's.
pub async fn count_tokens(
    client: &reqwest::Client,
    profile: &Profile,
    request: &GenerateMessageRequest,
    incoming: &HeaderMap,
) -> Result<u64> {
    let mut probe = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
    });
    if let Some(fields) = probe.as_object_mut() {
        if let Some(system) = &request.system {
            fields.insert("system".to_string(), serde_json::to_value(system).unwrap_or_default());
        }
        if let Some(tools) = &request.tools {
            fields.insert("tools".to_string(), serde_json::to_value(tools).unwrap_or_default());
        }
        if let Some(thinking) = &request.thinking {
            fields.insert("thinking".to_string(), serde_json::to_value(thinking).unwrap_or_default());
        }
    }

    let response = forward_count_tokens(client, profile, incoming, Bytes::from(probe.to_string())).await?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| {
        log::warn!("failed to read count-tokens response: {err}");
        Error::api("could not read the count-tokens response").from_provider(Provider::Anthropic)
    })?;

    if !status.is_success() {
        return Err(Error::from_upstream(Provider::Anthropic, status.as_u16(), &bytes));
    }

    let parsed: CountTokensResponse = serde_json::from_slice(&bytes)
        .map_err(|err| Error::api(format!("unexpected count-tokens response: {err}")).from_provider(Provider::Anthropic))?;

    Ok(parsed.input_tokens)
}

fn apply_headers(
    mut builder: reqwest::RequestBuilder,
    profile: &Profile,
    incoming: &HeaderMap,
) -> reqwest::RequestBuilder {
    for (name, value) in scrub_request_headers(incoming) {
        if let Some(name) = name {
            builder = builder.header(name, value);
        }
    }

    // The profile's key wins; without one the client's own key passes through.
    match &profile.anthropic().api_key {
        Some(key) => builder = builder.header(API_KEY_HEADER, key.expose_secret()),
        None => {
            if let Some(key) = incoming.get(API_KEY_HEADER) {
                builder = builder.header(API_KEY_HEADER, key);
            }
        }
    }

    builder.header(VERSION_HEADER, profile.anthropic_version())
}
