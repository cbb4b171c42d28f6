//! Configuration structures for the adapter.
//!
//! The configuration file is YAML. Profile definition order is significant:
//! the first profile whose pattern list matches the requested model wins.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

mod loader;
mod profile;

pub use loader::load;
pub use profile::{
    AnthropicConfig, OpenRouterConfig, Options, Profile, ProfileConfig, ProfileManager, ReasoningFormat,
    ReasoningOptions,
};

/// Root configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listen address for the HTTP server.
    #[serde(default)]
    pub http: HttpConfig,

    /// Optional snapshot sink URI, e.g. `jsonl:/var/log/adapter/snapshots.jsonl`.
    #[serde(default)]
    pub snapshot: Option<String>,

    /// Upstream profiles in priority order.
    #[serde(default)]
    pub profiles: IndexMap<String, ProfileConfig>,
}

impl Config {
    /// Builds the immutable profile manager snapshot for this configuration.
    pub fn profile_manager(&self) -> ProfileManager {
        ProfileManager::new(
            self.profiles
                .iter()
                .map(|(name, config)| Profile::new(name.clone(), config.clone()))
                .collect(),
        )
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Interface to bind, defaults to localhost.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Upstream API flavor a profile routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
