//! connect-upload: chunked client-streaming uploads over Connect.
//!
//! - `serve` accepts uploads and answers each with the name and the total
//!   number of bytes it received
//! - `send` splits a payload into frames, streams them, and logs the answer
//!
//! Configuration comes from CLI arguments or a TOML file.

mod config;
mod payload;
mod send;
mod serve;

use config::{Config, Mode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.mode {
        Mode::Serve(serve) => serve::run(serve).await,
        Mode::Send(send) => send::run(send).await,
    }
}
