//! The `serve` command.

use anyhow::Context;
use connect_upload::UploadService;
use connect_upload_core::cancel;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::ServeConfig;

/// Serve uploads until Ctrl-C, then drain for at most the grace period.
pub async fn run(config: ServeConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    let addr = listener.local_addr()?;

    let mut service = UploadService::new().limits(config.limits);
    if let Some(timeout) = config.timeout {
        service = service.timeout(timeout);
    }

    info!(
        %addr,
        max_message_size = ?config.limits.max_message_size(),
        timeout_ms = config.timeout.map(|t| t.as_millis() as u64),
        "listening for uploads"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, service.router())
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("server task failed")??;
            return Ok(());
        }
        status = cancel::signal() => info!("shutting down: {status}"),
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.shutdown_grace, &mut server).await {
        Ok(result) => result.context("server task failed")??,
        Err(_) => {
            warn!(
                grace_ms = config.shutdown_grace.as_millis() as u64,
                "uploads still in flight after grace period, aborting"
            );
            server.abort();
        }
    }
    Ok(())
}
