//! gRPC server assembly: builds the registry stack, registers the
//! `Automation` and `google.longrunning.Operations` services (plus
//! reflection from the bundled descriptor set), and serves over TCP or a
//! unix domain socket with cooperative shutdown.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
mod operations;
mod service;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;
use tracing::warn;

use macos_use_core::platform::SystemOperations;

use macos_use_proto::google::longrunning::operations_server::OperationsServer;
use macos_use_proto::macosusesdk::v1::automation_server::AutomationServer;

pub use crate::config::ServerConfig;
pub use crate::config::Transport;
pub use crate::operations::OperationsService;
pub use crate::service::AutomationService;

/// Delay between binding a unix socket and tightening its mode, giving the
/// host a beat to materialize the inode.
const UDS_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Installs SIGTERM/SIGINT handlers that trip the shutdown token.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let interrupted = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(terminate) => terminate,
                Err(err) => {
                    warn!("failed to install SIGTERM handler: {err}");
                    interrupted.await.ok();
                    shutdown.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = interrupted => info!("SIGINT received"),
                _ = terminate.recv() => info!("SIGTERM received"),
            }
        }
        #[cfg(not(unix))]
        {
            interrupted.await.ok();
            info!("interrupt received");
        }
        shutdown.cancel();
    });
}

/// Serves until the shutdown token fires. Background work (reapers,
/// observation pumps, operation tasks) is bound to the same token.
pub async fn serve(
    config: ServerConfig,
    system: Arc<dyn SystemOperations>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    // Restrictive umask before any socket is created, so a unix socket is
    // never observable with loose permissions.
    #[cfg(unix)]
    unsafe {
        libc::umask(0o177);
    }

    let automation = AutomationService::new(system, shutdown.clone());
    automation.spawn_reapers();
    let observations = Arc::clone(&automation.observations);
    let operation_store = Arc::clone(&automation.operations);

    let mut router = Server::builder()
        .add_service(AutomationServer::new(automation))
        .add_service(OperationsServer::new(OperationsService::new(
            operation_store,
        )));

    // Reflection is best-effort: without it the server still serves.
    match tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(macos_use_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
    {
        Ok(reflection) => {
            router = router.add_service(reflection);
        }
        Err(err) => {
            warn!("gRPC reflection unavailable: {err}");
        }
    }

    match &config.transport {
        Transport::Tcp { host, port } => {
            let Some(addr) = config.socket_addr()? else {
                anyhow::bail!("TCP transport without a listen address");
            };
            info!("serving gRPC on {host}:{port}");
            router
                .serve_with_shutdown(addr, shutdown.clone().cancelled_owned())
                .await?;
        }
        #[cfg(unix)]
        Transport::Unix { path } => {
            use std::os::unix::fs::PermissionsExt;

            use tokio_stream::wrappers::UnixListenerStream;

            // A stale socket file from a previous run would fail the bind.
            let _ = tokio::fs::remove_file(path).await;
            let listener = tokio::net::UnixListener::bind(path)?;
            tokio::time::sleep(UDS_SETTLE_DELAY).await;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;

            info!("serving gRPC on unix socket {}", path.display());
            router
                .serve_with_incoming_shutdown(
                    UnixListenerStream::new(listener),
                    shutdown.clone().cancelled_owned(),
                )
                .await?;
        }
        #[cfg(not(unix))]
        Transport::Unix { path } => {
            anyhow::bail!("unix sockets are not supported on this host: {}", path.display());
        }
    }

    // Serve loop is done; detach native observers and stop reapers.
    shutdown.cancel();
    observations.shutdown().await;
    info!("server stopped");
    Ok(())
}
