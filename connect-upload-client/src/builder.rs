//! Client builder for the upload client.
//!
//! Provides a fluent API for configuring and building an [`UploadClient`].

use std::num::NonZeroUsize;
use std::time::Duration;

use connect_upload_core::{CompressionEncoding, Encoding, MAX_ENVELOPE_PAYLOAD, UPLOAD_PROCEDURE};
use rustls::ClientConfig;

use crate::chunker::Chunker;
use crate::client::UploadClient;
use crate::transport::HyperTransport;

/// Builder for creating an [`UploadClient`].
///
/// # Example
///
/// ```ignore
/// use connect_upload_client::{ClientBuilder, CompressionEncoding};
///
/// let client = ClientBuilder::new("http://localhost:8080")
///     .compression(CompressionEncoding::Gzip)
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Base URL of the server (e.g., "http://localhost:8080").
    base_url: String,
    /// Protobuf (default) or JSON message encoding.
    encoding: Encoding,
    /// Per-frame compression.
    compression: CompressionEncoding,
    /// Deadline for a whole upload.
    timeout: Option<Duration>,
    /// Speak HTTP/2 without negotiation on plain connections.
    http2_prior_knowledge: bool,
    /// Largest payload slice per frame.
    frame_size: Option<NonZeroUsize>,
    /// Custom TLS configuration instead of the native roots.
    tls_config: Option<ClientConfig>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("encoding", &self.encoding)
            .field("compression", &self.compression)
            .field("timeout", &self.timeout)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .field("frame_size", &self.frame_size)
            .field("tls_config", &self.tls_config.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new builder for the server at `base_url`.
    ///
    /// The base URL includes the scheme and host; a trailing slash is ignored.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            encoding: Encoding::Proto,
            compression: CompressionEncoding::Identity,
            timeout: None,
            http2_prior_knowledge: false,
            frame_size: None,
            tls_config: None,
        }
    }

    /// Use JSON encoding for frames and the response.
    pub fn use_json(mut self) -> Self {
        self.encoding = Encoding::Json;
        self
    }

    /// Use protobuf encoding for frames and the response (the default).
    pub fn use_proto(mut self) -> Self {
        self.encoding = Encoding::Proto;
        self
    }

    /// Compress every frame with `encoding`.
    ///
    /// Default is `Identity`. The server answers in the same encoding.
    pub fn compression(mut self, encoding: CompressionEncoding) -> Self {
        self.compression = encoding;
        self
    }

    /// Set a deadline for each upload.
    ///
    /// The deadline is propagated to the server via the `Connect-Timeout-Ms`
    /// header and is also enforced locally, covering connection time, every
    /// frame sent, and the wait for the response.
    ///
    /// Values beyond the 10-digit millisecond limit of the header are enforced
    /// locally only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Speak HTTP/2 from the first byte on plain `http://` URLs (h2c).
    ///
    /// `https://` URLs negotiate HTTP/2 through ALPN without it.
    pub fn http2_prior_knowledge(mut self) -> Self {
        self.http2_prior_knowledge = true;
        self
    }

    /// Set the largest payload slice carried by one frame.
    ///
    /// Defaults to [`DEFAULT_FRAME_SIZE`](connect_upload_core::chunk::DEFAULT_FRAME_SIZE).
    /// Keep it below the server's message limit.
    pub fn frame_size(mut self, size: NonZeroUsize) -> Self {
        self.frame_size = Some(size);
        self
    }

    /// Use a custom TLS configuration.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Build the UploadClient.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not form a valid URI, the frame
    /// size cannot be described by an envelope length prefix, or the TLS
    /// configuration cannot be created.
    pub fn build(self) -> Result<UploadClient, BuildError> {
        let base_url = self.base_url.trim_end_matches('/');
        let uri: http::Uri = format!("{base_url}{UPLOAD_PROCEDURE}")
            .parse()
            .map_err(|e: http::uri::InvalidUri| BuildError::InvalidUrl(e.to_string()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(BuildError::InvalidUrl(format!(
                "{base_url}: expected scheme and host"
            )));
        }

        let mut transport = HyperTransport::builder().http2_only(self.http2_prior_knowledge);
        if let Some(config) = self.tls_config {
            transport = transport.tls_config(config);
        }

        let chunker = match self.frame_size {
            Some(size) if size.get() > MAX_ENVELOPE_PAYLOAD => {
                return Err(BuildError::FrameSize(size.get()));
            }
            Some(size) => Chunker::new(size),
            None => Chunker::default(),
        };

        Ok(UploadClient::new(
            transport.build()?,
            uri,
            self.encoding,
            self.compression,
            self.timeout,
            chunker,
        ))
    }
}

/// Why [`ClientBuilder::build`] failed.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The base URL does not form a valid request URI.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Frames this large do not fit an envelope.
    #[error("frame size {0} exceeds the envelope limit of {max} bytes", max = MAX_ENVELOPE_PAYLOAD)]
    FrameSize(usize),

    /// Failed to set up TLS.
    #[error("failed to configure TLS: {0}")]
    Tls(String),
}
