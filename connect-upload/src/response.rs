//! Encoding the terminal outcome of an upload as an HTTP response.
//!
//! Once the request has been accepted as a Connect stream, every outcome is an
//! HTTP 200 streaming body: the response message followed by `{}`, or only an
//! end-of-stream envelope carrying the error. Requests rejected before that
//! point get an HTTP error status with a Connect JSON error body.

use axum::{
    Json,
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use connect_upload_core::{
    CONNECT_CONTENT_ENCODING, CompressionEncoding, Encoding, Status, UploadError, UploadResponse,
    end_stream_envelope, wrap_envelope,
};

/// Build the streaming response for a finished session.
pub fn streaming_response(
    encoding: Encoding,
    compression: CompressionEncoding,
    outcome: Result<UploadResponse, UploadError>,
) -> Response {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => return streaming_error(encoding, &err.into_status()),
    };

    let payload = match encoding.encode(&response) {
        Ok(payload) => payload,
        Err(status) => return streaming_error(encoding, &status),
    };
    let (data, compressed) = match compression.compress(payload) {
        Ok(result) => result,
        Err(err) => return streaming_error(encoding, &err.into()),
    };

    let message_frame = match wrap_envelope(&data, compressed) {
        Ok(frame) => frame,
        Err(err) => return streaming_error(encoding, &err.into()),
    };
    let end_stream_frame = end_stream_envelope(None);
    let mut body = BytesMut::with_capacity(message_frame.len() + end_stream_frame.len());
    body.extend_from_slice(&message_frame);
    body.extend_from_slice(&end_stream_frame);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoding.content_type());
    if !compression.is_identity() {
        builder = builder.header(CONNECT_CONTENT_ENCODING, compression.as_str());
    }

    builder
        .body(Body::from(body.freeze()))
        .unwrap_or_else(|_| {
            streaming_error(encoding, &Status::internal("failed to build response"))
        })
}

/// Build a streaming response that carries only an end-of-stream error.
pub fn streaming_error(encoding: Encoding, status: &Status) -> Response {
    let mut response = Response::new(Body::from(end_stream_envelope(Some(status))));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(encoding.content_type()),
    );
    response
}

/// Reject a request outright with an HTTP status and a Connect JSON error body.
pub fn http_error(status_code: StatusCode, status: &Status) -> Response {
    (status_code, Json(status)).into_response()
}
