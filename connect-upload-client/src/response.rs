//! Reading the terminal response of an upload.

use bytes::Bytes;
use connect_upload_core::{
    CONNECT_CONTENT_ENCODING, Code, CompressionEncoding, Encoding, EnvelopeDecoder, Status,
    UploadError, UploadResponse, parse_end_stream,
};
use http_body::Body;
use http_body_util::BodyExt;

/// Decode the HTTP response of a client-streaming call.
///
/// A successful exchange is exactly one response message followed by an
/// end-of-stream envelope. An error carried in the end-of-stream envelope, or
/// an HTTP error status, is returned as a receive failure.
pub async fn read_response<B>(
    response: http::Response<B>,
    encoding: Encoding,
) -> Result<UploadResponse, UploadError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let (parts, mut body) = response.into_parts();

    if !parts.status.is_success() {
        let bytes = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();
        return Err(UploadError::receive(parse_error_body(parts.status, &bytes)));
    }

    let content_encoding = parts
        .headers
        .get(CONNECT_CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());
    let compression = CompressionEncoding::from_header(content_encoding).ok_or_else(|| {
        UploadError::receive(Status::internal(format!(
            "unsupported response encoding: {content_encoding:?}"
        )))
    })?;

    let mut decoder = EnvelopeDecoder::new(None);
    let mut message: Option<UploadResponse> = None;

    loop {
        while let Some(envelope) = decoder
            .next_envelope()
            .map_err(|e| UploadError::receive(e.into()))?
        {
            if envelope.is_end_stream() {
                if let Some(status) =
                    parse_end_stream(&envelope.payload).map_err(|e| UploadError::receive(e.into()))?
                {
                    return Err(UploadError::receive(status));
                }
                return message.ok_or_else(|| {
                    UploadError::receive(Status::unimplemented(
                        "expected response message but stream ended",
                    ))
                });
            }

            if message.is_some() {
                return Err(UploadError::receive(Status::unimplemented(
                    "expected one response message, got more",
                )));
            }
            let payload = if envelope.is_compressed() {
                compression
                    .decompress(envelope.payload, None)
                    .map_err(|e| UploadError::receive(e.into()))?
            } else {
                envelope.payload
            };
            message = Some(encoding.decode(&payload).map_err(UploadError::receive)?);
        }

        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    decoder.push(data);
                }
            }
            Some(Err(err)) => {
                return Err(UploadError::receive(Status::unavailable(format!(
                    "read response body: {err}"
                ))));
            }
            None => {
                return Err(UploadError::receive(Status::internal(
                    "protocol error: response ended without end-of-stream envelope",
                )));
            }
        }
    }
}

/// Build a status from a non-2xx response.
///
/// Prefers the Connect error JSON in the body; falls back to mapping the
/// HTTP status code.
pub fn parse_error_body(status: http::StatusCode, body: &[u8]) -> Status {
    if let Ok(parsed) = serde_json::from_slice::<Status>(body) {
        return parsed;
    }

    let code = Code::from_http_status(status.as_u16());
    let message = match std::str::from_utf8(body) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Status::new(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_upload_core::{end_stream_envelope, wrap_envelope};
    use http_body_util::Full;

    fn response(
        status: u16,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::from(body))).unwrap()
    }

    fn message_envelope(encoding: Encoding, name: &str, size: i64) -> Bytes {
        let payload = encoding
            .encode(&UploadResponse {
                name: name.into(),
                size,
            })
            .unwrap();
        wrap_envelope(&payload, false).unwrap()
    }

    #[tokio::test]
    async fn test_message_then_end_stream() {
        let mut body = message_envelope(Encoding::Proto, "test", 50).to_vec();
        body.extend_from_slice(&end_stream_envelope(None));

        let result = read_response(response(200, &[], body), Encoding::Proto).await;
        assert_eq!(
            result,
            Ok(UploadResponse {
                name: "test".into(),
                size: 50
            })
        );
    }

    #[tokio::test]
    async fn test_end_stream_error() {
        let body = end_stream_envelope(Some(&Status::resource_exhausted("too big"))).to_vec();
        let err = read_response(response(200, &[], body), Encoding::Json)
            .await
            .unwrap_err();
        assert_eq!(err, UploadError::Receive(Status::resource_exhausted("too big")));
    }

    #[tokio::test]
    async fn test_end_stream_deadline_is_canceled() {
        let body = end_stream_envelope(Some(&Status::deadline_exceeded("slow"))).to_vec();
        let err = read_response(response(200, &[], body), Encoding::Json)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_missing_message() {
        let body = end_stream_envelope(None).to_vec();
        let err = read_response(response(200, &[], body), Encoding::Proto)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_two_messages() {
        let mut body = message_envelope(Encoding::Proto, "a", 1).to_vec();
        body.extend_from_slice(&message_envelope(Encoding::Proto, "b", 2));
        body.extend_from_slice(&end_stream_envelope(None));

        let err = read_response(response(200, &[], body), Encoding::Proto)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_missing_end_stream() {
        let body = message_envelope(Encoding::Proto, "a", 1).to_vec();
        let err = read_response(response(200, &[], body), Encoding::Proto)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_http_error_with_connect_body() {
        let body = br#"{"code":"unknown","message":"unsupported content-type"}"#.to_vec();
        let err = read_response(
            response(415, &[("content-type", "application/json")], body),
            Encoding::Proto,
        )
        .await
        .unwrap_err();
        assert_eq!(err, UploadError::Receive(Status::unknown("unsupported content-type")));
    }

    #[tokio::test]
    async fn test_unknown_response_encoding() {
        let body = end_stream_envelope(None).to_vec();
        let err = read_response(
            response(200, &[("connect-content-encoding", "br")], body),
            Encoding::Proto,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn test_parse_error_body_falls_back_to_http_status() {
        let status = parse_error_body(http::StatusCode::NOT_FOUND, b"");
        assert_eq!(status.code(), Code::Unimplemented);
        assert_eq!(status.message(), Some("Not Found"));

        let status = parse_error_body(http::StatusCode::BAD_GATEWAY, b"upstream down\n");
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), Some("upstream down"));

        let status = parse_error_body(http::StatusCode::TOO_MANY_REQUESTS, b"<html>");
        assert_eq!(status.code(), Code::ResourceExhausted);
    }
}
