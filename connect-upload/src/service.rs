//! The axum service exposing the upload procedure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::any,
};
use connect_upload_core::{Status, UPLOAD_PROCEDURE, UploadResponse, cancel, effective_timeout};
use futures::future::Either;

use crate::accumulator::Accumulator;
use crate::limits::MessageLimits;
use crate::protocol::UploadProtocol;
use crate::request::frame_stream;
use crate::response::streaming_response;

/// Receiving side of the upload procedure.
///
/// Every request runs one [`Accumulator`] over the frames of its body and
/// answers with the aggregate, or with the classified failure.
///
/// # Example
///
/// ```rust,no_run
/// use connect_upload::{MessageLimits, UploadService};
/// use std::time::Duration;
///
/// # async fn serve() -> std::io::Result<()> {
/// let app = UploadService::new()
///     .limits(MessageLimits::new(64 * 1024 * 1024))
///     .timeout(Duration::from_secs(300))
///     .router();
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct UploadService {
    limits: MessageLimits,
    timeout: Option<Duration>,
}

impl UploadService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-message size limit.
    pub fn limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Server-side deadline for a whole upload.
    ///
    /// A shorter `connect-timeout-ms` from the client takes precedence.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a router serving the upload procedure.
    pub fn router(self) -> Router {
        Router::new()
            .route(UPLOAD_PROCEDURE, any(handle_upload))
            .with_state(Arc::new(self))
    }

    /// Run one upload session to its terminal response.
    pub async fn upload(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();

        let protocol = match UploadProtocol::negotiate(&parts.method, &parts.headers) {
            Ok(protocol) => protocol,
            Err(rejection) => {
                tracing::warn!("rejected upload request: {}", rejection.status());
                return rejection.into_response();
            }
        };

        let timeout = effective_timeout(self.timeout, protocol.timeout);
        let started = Instant::now();
        let mut source = Box::pin(frame_stream(
            body,
            protocol.encoding,
            protocol.compression,
            self.limits,
        ));

        let outcome = Accumulator::new()
            .run_until(&mut source, interrupt(timeout))
            .await;

        match &outcome {
            Ok(aggregate) => tracing::info!(
                name = %aggregate.name,
                size = aggregate.size,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upload complete"
            ),
            Err(err) => tracing::warn!(
                code = %err.code(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upload failed: {err}"
            ),
        }

        streaming_response(
            protocol.encoding,
            protocol.compression,
            outcome.map(UploadResponse::from),
        )
    }
}

fn interrupt(timeout: Option<Duration>) -> impl Future<Output = Status> {
    match timeout {
        Some(timeout) => Either::Left(cancel::deadline(timeout)),
        None => Either::Right(cancel::never()),
    }
}

async fn handle_upload(State(service): State<Arc<UploadService>>, request: Request) -> Response {
    service.upload(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use bytes::Bytes;
    use connect_upload_core::{
        Code, Encoding, EnvelopeDecoder, UploadRequest, end_stream_envelope, parse_end_stream,
        wrap_envelope,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn upload_body(encoding: Encoding, name: &str, lens: &[usize]) -> Vec<u8> {
        let mut body = Vec::new();
        for len in lens {
            let frame = UploadRequest {
                name: name.into(),
                data: Bytes::from(vec![0x69; *len]),
            };
            let payload = encoding.encode(&frame).unwrap();
            body.extend_from_slice(&wrap_envelope(&payload, false).unwrap());
        }
        body.extend_from_slice(&end_stream_envelope(None));
        body
    }

    fn post(content_type: &str, body: Vec<u8>) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(UPLOAD_PROCEDURE)
            .header(header::CONTENT_TYPE, content_type)
            .header("connect-protocol-version", "1")
            .body(Body::from(body))
            .unwrap()
    }

    /// Returns the decoded response message, or the end-of-stream error.
    async fn outcome(response: Response, encoding: Encoding) -> Result<UploadResponse, Status> {
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let mut decoder = EnvelopeDecoder::new(None);
        decoder.push(&bytes);

        let mut message = None;
        while let Some(envelope) = decoder.next_envelope().unwrap() {
            if envelope.is_end_stream() {
                if let Some(status) = parse_end_stream(&envelope.payload).unwrap() {
                    return Err(status);
                }
                return Ok(message.expect("response message before end of stream"));
            }
            message = Some(encoding.decode::<UploadResponse>(&envelope.payload).unwrap());
        }
        panic!("response ended without end-of-stream envelope");
    }

    #[tokio::test]
    async fn test_upload_fifty_bytes() {
        let app = UploadService::new().router();
        let body = upload_body(Encoding::Proto, "test", &[20, 20, 10]);

        let response = app
            .oneshot(post("application/connect+proto", body))
            .await
            .unwrap();
        let response = outcome(response, Encoding::Proto).await.unwrap();
        assert_eq!(
            response,
            UploadResponse {
                name: "test".into(),
                size: 50
            }
        );
    }

    #[tokio::test]
    async fn test_upload_json() {
        let app = UploadService::new().router();
        let body = upload_body(Encoding::Json, "json", &[3, 4]);

        let response = app
            .oneshot(post("application/connect+json", body))
            .await
            .unwrap();
        let response = outcome(response, Encoding::Json).await.unwrap();
        assert_eq!(response.name, "json");
        assert_eq!(response.size, 7);
    }

    #[tokio::test]
    async fn test_empty_upload() {
        let app = UploadService::new().router();
        let body = upload_body(Encoding::Proto, "unused", &[]);

        let response = app
            .oneshot(post("application/connect+proto", body))
            .await
            .unwrap();
        let response = outcome(response, Encoding::Proto).await.unwrap();
        assert_eq!(response, UploadResponse::default());
    }

    #[tokio::test]
    async fn test_oversize_frame_is_rejected() {
        let app = UploadService::new()
            .limits(MessageLimits::new(32))
            .router();
        let body = upload_body(Encoding::Proto, "test", &[8, 64]);

        let response = app
            .oneshot(post("application/connect+proto", body))
            .await
            .unwrap();
        let status = outcome(response, Encoding::Proto).await.unwrap_err();
        assert_eq!(status.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_truncated_body_is_error_not_partial() {
        let app = UploadService::new().router();
        let mut body = upload_body(Encoding::Proto, "test", &[20, 20]);
        // Drop the end-of-stream envelope and cut into the last frame.
        body.truncate(body.len() - 10);

        let response = app
            .oneshot(post("application/connect+proto", body))
            .await
            .unwrap();
        let status = outcome(response, Encoding::Proto).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_stalled_upload_hits_deadline() {
        let app = UploadService::new().router();

        // A body that never finishes.
        let (_tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, std::io::Error>>(1);
        let request = Request::builder()
            .method(Method::POST)
            .uri(UPLOAD_PROCEDURE)
            .header(header::CONTENT_TYPE, "application/connect+proto")
            .header("connect-timeout-ms", "50")
            .body(Body::from_stream(rx))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = outcome(response, Encoding::Proto).await.unwrap_err();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_415() {
        let app = UploadService::new().router();
        let response = app
            .oneshot(post("application/json", b"{}".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_get_is_405() {
        let app = UploadService::new().router();
        let request = Request::builder()
            .method(Method::GET)
            .uri(UPLOAD_PROCEDURE)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = UploadService::new().router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload.v1.UploadService/Download")
            .header(header::CONTENT_TYPE, "application/connect+proto")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
