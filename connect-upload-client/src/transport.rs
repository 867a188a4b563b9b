//! Hyper-based HTTP transport.
//!
//! [`HyperTransport`] wraps hyper_util's pooled legacy client with an
//! HTTPS-or-HTTP connector. The request body is a [`TransportBody`] fed by the
//! upload session, so frames go out on the wire as they are sent.

mod body;
mod connector;

use std::time::Duration;

use connect_upload_core::Status;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config};

use crate::BuildError;

/// Idle pooled connections are closed after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Pooled HTTP client for upload requests.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, TransportBody>,
    http2_only: bool,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// Send a request and wait for the response head.
    ///
    /// Failing to reach the server, or losing the connection before the
    /// response head arrives, is reported as `unavailable`.
    pub async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, Status> {
        self.client.request(request).await.map_err(|e| {
            let stage = if e.is_connect() { "connect" } else { "request failed" };
            Status::unavailable(format!("{stage}: {}", error_chain(&e)))
        })
    }
}

/// Render an error with all of its sources, outermost first.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Builder for [`HyperTransport`].
#[derive(Debug, Default)]
pub struct HyperTransportBuilder {
    tls_config: Option<ClientConfig>,
    http2_only: bool,
}

impl HyperTransportBuilder {
    /// Use a custom TLS configuration instead of the native roots.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Speak HTTP/2 without negotiation.
    ///
    /// Needed for h2c servers; over TLS, HTTP/2 is negotiated via ALPN anyway.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    pub fn build(self) -> Result<HyperTransport, BuildError> {
        let tls_config = match self.tls_config {
            Some(config) => config,
            None => default_tls_config()?,
        };

        let mut builder = Client::builder(TokioExecutor::new());
        // The idle timeout only fires with a timer installed.
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .http2_only(self.http2_only);

        Ok(HyperTransport {
            client: builder.build(build_https_connector(tls_config)),
            http2_only: self.http2_only,
        })
    }
}
