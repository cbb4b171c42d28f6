use config::{Profile, Provider};
use eventsource_stream::Eventsource as _;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret as _;

use crate::error::{Error, Result};
use crate::protocol::openrouter::{ChatCompletionChunk, ChatCompletionRequest};

/// Stream of decoded chunks from an in-flight chat completion.
pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk>>;

/// Identity headers OpenRouter uses for app attribution.
const REFERER_HEADER: &str = "HTTP-Referer";
const TITLE_HEADER: &str = "X-Title";
const APP_REFERER: &str = "https://github.com/x5iu/claude-code-adapter";
const APP_TITLE: &str = "claude-code-adapter";

/// Opens a streamed chat completion against the profile's OpenRouter
/// upstream and decodes the SSE body into chunks.
///
/// Upstream HTTP errors are classified before any chunk is produced;
/// transport failures mid-stream surface as error items on the stream.
pub async fn chat_completion_stream(
    client: &reqwest::Client,
    profile: &Profile,
    request: &ChatCompletionRequest,
) -> Result<ChunkStream> {
    let url = format!("{}/v1/chat/completions", profile.openrouter_base_url().trim_end_matches('/'));

    let mut builder = client
        .post(url)
        .header(REFERER_HEADER, APP_REFERER)
        .header(TITLE_HEADER, APP_TITLE)
        .header(http::header::CONTENT_TYPE, "application/json");

    if let Some(key) = &profile.openrouter().api_key {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
    }

    let response = builder.json(request).send().await.map_err(|err| {
        log::error!("failed to reach OpenRouter upstream: {err}");
        Error::api("could not connect to the OpenRouter upstream").from_provider(Provider::OpenRouter)
    })?;

    let status = response.status();
    if !status.is_success() {
        let bytes = response.bytes().await.unwrap_or_default();
        return Err(Error::from_upstream(Provider::OpenRouter, status.as_u16(), &bytes));
    }

    let chunks = response.bytes_stream().eventsource().filter_map(|event| async move {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                log::error!("OpenRouter stream transport error: {err}");
                return Some(Err(
                    Error::api("the OpenRouter stream ended unexpectedly").from_provider(Provider::OpenRouter)
                ));
            }
        };

        if event.data == "[DONE]" {
            return None;
        }

        match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
            Ok(chunk) => Some(Ok(chunk)),
            Err(err) => {
                // Comment frames and schema drift are skipped, not fatal.
                log::warn!("failed to parse OpenRouter chunk: {err}");
                log::debug!("offending chunk payload: {}", event.data);
                None
            }
        }
    });

    Ok(chunks.boxed())
}
