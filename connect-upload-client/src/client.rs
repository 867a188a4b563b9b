//! HTTP upload client.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use connect_upload_core::{
    CONNECT_ACCEPT_ENCODING, CONNECT_CONTENT_ENCODING, CONNECT_PROTOCOL_VERSION,
    CONNECT_PROTOCOL_VERSION_HEADER, CONNECT_TIMEOUT_MS_HEADER, CompressionEncoding, Encoding,
    Status, UploadError, UploadResponse, UploadTransport, format_timeout_ms,
};
use http::header::CONTENT_TYPE;
use tokio::time::Instant;

use crate::builder::ClientBuilder;
use crate::chunker::Chunker;
use crate::response::read_response;
use crate::stream::ClientStream;
use crate::transport::{HyperTransport, TransportBody};

/// Envelopes buffered between the chunker and the connection.
const BODY_CAPACITY: usize = 1;

/// Client for the upload procedure.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```ignore
/// let client = UploadClient::builder("http://localhost:8080").build()?;
/// let response = client.upload("test", Bytes::from(vec![0; 50])).await?;
/// assert_eq!(response.size, 50);
/// ```
#[derive(Clone, Debug)]
pub struct UploadClient {
    transport: HyperTransport,
    uri: http::Uri,
    encoding: Encoding,
    compression: CompressionEncoding,
    timeout: Option<Duration>,
    chunker: Chunker,
}

impl UploadClient {
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub(crate) fn new(
        transport: HyperTransport,
        uri: http::Uri,
        encoding: Encoding,
        compression: CompressionEncoding,
        timeout: Option<Duration>,
        chunker: Chunker,
    ) -> Self {
        Self {
            transport,
            uri,
            encoding,
            compression,
            timeout,
            chunker,
        }
    }

    /// The full URI of the upload procedure.
    pub fn uri(&self) -> &http::Uri {
        &self.uri
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Upload `payload` under `name` in one session.
    pub async fn upload(&self, name: &str, payload: Bytes) -> Result<UploadResponse, UploadError> {
        let sink = self.open_upload().await?;
        self.chunker.upload(sink, name, payload).await
    }

    /// Like [`upload`](Self::upload), but gives up as soon as `interrupt` fires.
    pub async fn upload_until<I>(
        &self,
        name: &str,
        payload: Bytes,
        interrupt: I,
    ) -> Result<UploadResponse, UploadError>
    where
        I: Future<Output = Status>,
    {
        connect_upload_core::cancel::until(self.upload(name, payload), interrupt).await
    }

    fn build_request(&self, body: TransportBody) -> Result<http::Request<TransportBody>, Status> {
        let mut builder = http::Request::post(self.uri.clone())
            .header(CONTENT_TYPE, self.encoding.content_type())
            .header(CONNECT_PROTOCOL_VERSION_HEADER, CONNECT_PROTOCOL_VERSION)
            .header(CONNECT_ACCEPT_ENCODING, CompressionEncoding::supported());

        if !self.compression.is_identity() {
            builder = builder.header(CONNECT_CONTENT_ENCODING, self.compression.as_str());
        }
        if let Some(timeout) = self.timeout.and_then(format_timeout_ms) {
            builder = builder.header(CONNECT_TIMEOUT_MS_HEADER, timeout);
        }

        builder
            .body(body)
            .map_err(|e| Status::internal(format!("failed to build request: {e}")))
    }
}

impl UploadTransport for UploadClient {
    type Sink = ClientStream;

    /// Start the request and hand back its sending half.
    ///
    /// The request is sent in the background; its body is whatever the
    /// returned stream pushes, and its response is read once the stream is
    /// closed.
    async fn open_upload(&self) -> Result<ClientStream, UploadError> {
        let (envelopes, body) = TransportBody::channel(BODY_CAPACITY);
        let request = self.build_request(body).map_err(UploadError::send)?;
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);

        tracing::debug!(
            uri = %self.uri,
            encoding = self.encoding.content_type(),
            compression = self.compression.as_str(),
            "opening upload"
        );

        let transport = self.transport.clone();
        let encoding = self.encoding;
        let response = tokio::spawn(async move {
            let response = transport.request(request).await.map_err(UploadError::send)?;
            read_response(response, encoding).await
        });

        Ok(ClientStream::new(
            envelopes,
            response,
            self.encoding,
            self.compression,
            deadline,
        ))
    }
}
