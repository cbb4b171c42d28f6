//! Upstream HTTP clients.

pub mod anthropic;
pub mod openrouter;

use std::time::Duration;

/// Shared client for all upstream calls; connections are pooled per host.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}
