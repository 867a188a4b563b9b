//! Adapting an HTTP request body into a frame source.

use axum::body::Body;
use connect_upload_core::{
    CompressionEncoding, Encoding, EnvelopeDecoder, Status, UploadError, UploadRequest,
    parse_end_stream,
};
use futures::Stream;
use http_body_util::BodyExt;

use crate::limits::MessageLimits;

/// Decode the enveloped frames of a streaming request body.
///
/// The stream ends (`None`) on an end-of-stream envelope or when the body ends
/// on an envelope boundary. Every failure is yielded once as a receive error,
/// after which the stream ends:
///
/// - envelope longer than the limit: `resource_exhausted`, before buffering it
/// - unknown envelope flags or a body cut mid-envelope: `invalid_argument`
/// - a payload that does not decode: `invalid_argument`
/// - the body itself failing: `unknown`
pub fn frame_stream(
    body: Body,
    encoding: Encoding,
    compression: CompressionEncoding,
    limits: MessageLimits,
) -> impl Stream<Item = Result<UploadRequest, UploadError>> + Send + 'static {
    async_stream::stream! {
        let mut decoder = EnvelopeDecoder::new(limits.max_message_size());
        let mut body = body;

        loop {
            loop {
                let envelope = match decoder.next_envelope() {
                    Ok(Some(envelope)) => envelope,
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(UploadError::receive(err.into()));
                        return;
                    }
                };

                if envelope.is_end_stream() {
                    match parse_end_stream(&envelope.payload) {
                        Ok(None) => {}
                        Ok(Some(status)) => {
                            yield Err(UploadError::receive(status));
                        }
                        Err(err) => {
                            yield Err(UploadError::receive(err.into()));
                        }
                    }
                    return;
                }

                let payload = if envelope.is_compressed() {
                    match compression.decompress(envelope.payload, limits.max_message_size()) {
                        Ok(payload) => payload,
                        Err(err) => {
                            yield Err(UploadError::receive(err.into()));
                            return;
                        }
                    }
                } else {
                    envelope.payload
                };

                match encoding.decode::<UploadRequest>(&payload) {
                    Ok(frame) => {
                        yield Ok(frame);
                    }
                    Err(status) => {
                        yield Err(UploadError::receive(status));
                        return;
                    }
                }
            }

            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        decoder.push(data);
                    }
                }
                Some(Err(err)) => {
                    yield Err(UploadError::receive(Status::unknown(format!(
                        "read enveloped message: {err}"
                    ))));
                    return;
                }
                None => {
                    if let Err(err) = decoder.finish() {
                        yield Err(UploadError::receive(Status::invalid_argument(format!(
                            "protocol error: {err}"
                        ))));
                    }
                    return;
                }
            }
        }
    }
}
