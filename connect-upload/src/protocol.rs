//! Request validation and negotiation for the upload route.

use std::time::Duration;

use axum::{
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use connect_upload_core::{
    CONNECT_CONTENT_ENCODING, CONNECT_PROTOCOL_VERSION, CONNECT_PROTOCOL_VERSION_HEADER,
    CONNECT_TIMEOUT_MS_HEADER, CompressionEncoding, Encoding, Status, parse_timeout_ms,
};

use crate::response::{http_error, streaming_error};

/// What an accepted upload request asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProtocol {
    pub encoding: Encoding,
    pub compression: CompressionEncoding,
    /// Client deadline from `connect-timeout-ms`.
    pub timeout: Option<Duration>,
}

/// Why a request was turned away before its body was read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Not recognisable as a Connect stream; answered with an HTTP error status.
    Http(StatusCode, Status),
    /// A Connect stream with unusable headers; answered with an end-of-stream error.
    Stream(Encoding, Status),
}

impl Rejection {
    pub fn status(&self) -> &Status {
        match self {
            Rejection::Http(_, status) | Rejection::Stream(_, status) => status,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::Http(StatusCode::METHOD_NOT_ALLOWED, status) => {
                let mut response = http_error(StatusCode::METHOD_NOT_ALLOWED, &status);
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST"));
                response
            }
            Rejection::Http(code, status) => http_error(code, &status),
            Rejection::Stream(encoding, status) => streaming_error(encoding, &status),
        }
    }
}

impl UploadProtocol {
    /// Validate the method and headers of an upload request.
    pub fn negotiate(method: &Method, headers: &HeaderMap) -> Result<Self, Rejection> {
        if method != Method::POST {
            return Err(Rejection::Http(
                StatusCode::METHOD_NOT_ALLOWED,
                Status::unimplemented(format!("HTTP method {method} is not supported")),
            ));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(encoding) = Encoding::from_content_type(content_type) else {
            return Err(Rejection::Http(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Status::unknown(format!("unsupported content-type {content_type:?}")),
            ));
        };

        if let Some(version) = headers.get(CONNECT_PROTOCOL_VERSION_HEADER) {
            let version = version.to_str().unwrap_or_default();
            if version != CONNECT_PROTOCOL_VERSION {
                return Err(Rejection::Stream(
                    encoding,
                    Status::invalid_argument(format!(
                        "connect-protocol-version must be \"{CONNECT_PROTOCOL_VERSION}\": got \"{version}\""
                    )),
                ));
            }
        }

        let requested = headers
            .get(CONNECT_CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let Some(compression) = CompressionEncoding::from_header(requested) else {
            return Err(Rejection::Stream(
                encoding,
                Status::unimplemented(format!(
                    "unknown compression {:?}: supported encodings are {}",
                    requested.unwrap_or_default(),
                    CompressionEncoding::supported()
                )),
            ));
        };

        Ok(UploadProtocol {
            encoding,
            compression,
            timeout: headers
                .get(CONNECT_TIMEOUT_MS_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_timeout_ms),
        })
    }
}
