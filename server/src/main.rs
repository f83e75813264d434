use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use macos_use_core::platform::UnsupportedSystem;
use macos_use_server::ServerConfig;
use macos_use_server::serve;
use macos_use_server::spawn_signal_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; level is controlled with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env()?;

    // Host integrations register a concrete adapter here; without one the
    // control plane (sessions, macros, operations) still serves and every
    // host-touching call reports the capability as unsupported.
    #[cfg(not(target_os = "macos"))]
    warn!("no host integration compiled in; desktop capabilities are unavailable");
    #[cfg(target_os = "macos")]
    warn!("accessibility adapter not wired in this build; desktop capabilities are unavailable");
    let system = Arc::new(UnsupportedSystem);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    serve(config, system, shutdown).await
}
