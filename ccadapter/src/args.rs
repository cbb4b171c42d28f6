use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

/// Protocol-translation reverse proxy for the Anthropic Messages API.
#[derive(Debug, Parser)]
#[command(name = "ccadapter", version)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Override the configured listen address, e.g. 127.0.0.1:8080.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "debug".
    #[arg(long, env = "CC_ADAPTER_LOG", default_value = "info")]
    pub log: String,
}

impl Args {
    /// Resolves the configuration file: `-c`, then `./config.yaml`, then
    /// `~/.claude-code-adapter/config.yaml`.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }

        let local = PathBuf::from("config.yaml");
        if local.exists() {
            return Ok(local);
        }

        if let Some(home) = dirs::home_dir() {
            let fallback = home.join(".claude-code-adapter").join("config.yaml");
            if fallback.exists() {
                return Ok(fallback);
            }
        }

        bail!("no configuration file found; pass -c, or create ./config.yaml or ~/.claude-code-adapter/config.yaml");
    }
}
