//! Protocol-translation core.
//!
//! Exposes the Anthropic Messages surface over axum and serves it either by
//! forwarding to an Anthropic-compatible upstream or by translating to the
//! OpenRouter Chat Completions API and back. Clients only ever see the
//! Anthropic wire format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    Router,
    routing::{get, post},
};

mod assemble;
mod error;
pub mod protocol;
mod server;
pub mod translate;
pub mod upstream;

pub use assemble::{AssembleError, ChatCompletionAssembler, MessageAssembler};
pub use error::{Error, ErrorKind, Result};
pub use server::handler::{PROVIDER_HEADER, REQUEST_ID_HEADER};

/// Shared state behind the HTTP handlers.
pub struct AppState {
    /// Published profile snapshot; reloads swap the pointer, in-flight
    /// requests keep the snapshot they resolved against.
    profiles: RwLock<Arc<config::ProfileManager>>,

    pub(crate) client: reqwest::Client,
    pub(crate) snapshot: Option<snapshot::Recorder>,
    request_counter: AtomicU64,
    pub(crate) version: String,
}

impl AppState {
    pub fn new(
        config: &config::Config,
        snapshot: Option<snapshot::Recorder>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let client =
            upstream::http_client().map_err(|err| Error::api(format!("failed to build the HTTP client: {err}")))?;

        Ok(Self {
            profiles: RwLock::new(Arc::new(config.profile_manager())),
            client,
            snapshot,
            request_counter: AtomicU64::new(0),
            version: version.into(),
        })
    }

    /// The current profile manager snapshot.
    pub fn profiles(&self) -> Arc<config::ProfileManager> {
        self.profiles.read().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Atomically publishes a freshly loaded profile manager.
    pub fn publish_profiles(&self, manager: config::ProfileManager) {
        if let Ok(mut guard) = self.profiles.write() {
            *guard = Arc::new(manager);
        }
    }

    fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Builds the router for the Anthropic-facing HTTP surface.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(server::handler::health))
        .route("/v1/messages", post(server::handler::messages))
        .route("/v1/messages/count_tokens", post(server::handler::count_tokens))
        .with_state(state)
}
