//! Server bootstrap.
//!
//! Reusable serve function for the binary and for integration tests: binds
//! the listener, assembles the router, and owns graceful shutdown and
//! configuration reloads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::body::Body;
use http::{HeaderValue, Response, StatusCode, header};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;

/// In-flight requests get this long to finish after the shutdown signal.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for serving the adapter.
pub struct ServeConfig {
    /// The socket address the server binds to.
    pub listen_address: SocketAddr,

    /// The deserialized YAML configuration.
    pub config: config::Config,

    /// Where the configuration was loaded from; enables SIGHUP reloads.
    pub config_path: Option<PathBuf>,

    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,

    /// Version string logged on startup and stamped into snapshots.
    pub version: String,

    /// Optional sender for the bound address (useful when port 0 was given).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        config_path,
        shutdown_signal,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("claude-code-adapter {version}");

    let recorder = match &config.snapshot {
        Some(uri) => {
            let path = snapshot::parse_sink_uri(uri)?;
            let (recorder, _writer) = snapshot::spawn(&path).await?;
            log::info!("snapshot sink: {}", path.display());
            Some(recorder)
        }
        None => None,
    };

    let state = Arc::new(llm::AppState::new(&config, recorder, version)?);

    let app = llm::router(state.clone()).layer(CatchPanicLayer::custom(PanicResponse));

    if let Some(path) = config_path {
        tokio::spawn(reload_profiles_on_sighup(path, state.clone(), shutdown_signal.clone()));
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|err| anyhow!("failed to bind to {listen_address}: {err}"))?;
    let bound = listener.local_addr()?;

    if let Some(sender) = bound_addr_sender
        && sender.send(bound).is_err()
    {
        log::warn!("nobody is listening for the bound address");
    }

    log::info!("listening on http://{bound}");

    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown_signal.clone();
        async move { shutdown.cancelled().await }
    });

    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            result.map_err(|err| anyhow!("server task failed: {err}"))??;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, draining in-flight requests");
            match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, &mut server_task).await {
                Ok(result) => {
                    result.map_err(|err| anyhow!("server task failed: {err}"))??;
                }
                Err(_) => {
                    log::warn!("drain deadline exceeded, forcing close");
                    server_task.abort();
                }
            }
        }
    }

    Ok(())
}

async fn reload_profiles_on_sighup(path: PathBuf, state: Arc<llm::AppState>, shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(err) => {
                log::error!("cannot install SIGHUP handler, profile reloads disabled: {err}");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                received = hangup.recv() => {
                    if received.is_none() {
                        return;
                    }
                }
            }

            match config::load(&path) {
                Ok(config) => {
                    state.publish_profiles(config.profile_manager());
                    log::info!("profiles reloaded from {}", path.display());
                }
                Err(err) => {
                    log::error!("profile reload failed, keeping the previous snapshot: {err:#}");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, state, shutdown);
    }
}

/// Renders recovered panics as the standard error envelope.
#[derive(Clone)]
struct PanicResponse;

impl tower_http::catch_panic::ResponseForPanic for PanicResponse {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn std::any::Any + Send + 'static>) -> Response<Self::ResponseBody> {
        let detail = if let Some(message) = err.downcast_ref::<String>() {
            message.as_str()
        } else if let Some(message) = err.downcast_ref::<&str>() {
            message
        } else {
            "unknown panic payload"
        };

        log::error!(
            "request handler panicked: {detail}\n{}",
            std::backtrace::Backtrace::force_capture()
        );

        let mut response = Response::new(Body::from(
            r#"{"type":"error","error":{"type":"api_error","message":"internal server error"}}"#,
        ));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
