use std::net::{SocketAddr, ToSocketAddrs as _};

use anyhow::anyhow;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

use args::Args;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(&args.log);

    let config_path = args.config_path()?;
    let config = config::load(&config_path)?;

    let listen_address = match args.listen {
        Some(address) => address,
        None => resolve_listen_address(&config.http)?,
    };

    let shutdown_signal = CancellationToken::new();

    tokio::spawn({
        let shutdown_signal = shutdown_signal.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, shutting down");
                shutdown_signal.cancel();
            }
        }
    });

    server::serve(server::ServeConfig {
        listen_address,
        config,
        config_path: Some(config_path),
        shutdown_signal,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}

fn resolve_listen_address(http: &config::HttpConfig) -> anyhow::Result<SocketAddr> {
    (http.host.as_str(), http.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("listen address '{}:{}' did not resolve", http.host, http.port))
}
