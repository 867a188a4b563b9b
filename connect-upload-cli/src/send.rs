//! The `send` command.

use std::time::Instant;

use anyhow::Context;
use connect_upload_client::{CompressionEncoding, UploadClient};
use connect_upload_core::{cancel, chunk};
use tracing::info;

use crate::config::SendConfig;
use crate::payload;

/// Upload one payload and log the server's answer.
///
/// Ctrl-C abandons the upload as canceled.
pub async fn run(config: SendConfig) -> anyhow::Result<()> {
    let payload = payload::load(&config.payload).await?;

    let mut builder = UploadClient::builder(config.endpoint.as_str()).frame_size(config.frame_size);
    if config.json {
        builder = builder.use_json();
    }
    if config.gzip {
        let gzip = CompressionEncoding::from_header(Some("gzip"))
            .context("gzip support is not compiled in")?;
        builder = builder.compression(gzip);
    }
    if config.http2_prior_knowledge {
        builder = builder.http2_prior_knowledge();
    }
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    info!(
        endpoint = %config.endpoint,
        name = %config.name,
        bytes = payload.len(),
        frames = chunk::frame_count(payload.len(), config.frame_size),
        "uploading"
    );

    let started = Instant::now();
    let response = client
        .upload_until(&config.name, payload, cancel::signal())
        .await?;

    info!(
        name = %response.name,
        size = response.size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "received response"
    );
    Ok(())
}
