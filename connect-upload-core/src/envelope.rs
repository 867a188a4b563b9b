//! Connect streaming envelope framing.
//!
//! Every message of a streaming RPC travels in an envelope:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! The length is big-endian. A stream is terminated by an end-of-stream
//! envelope whose payload is a JSON object, optionally carrying an error.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, Status};

/// Connect streaming envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Largest payload a 4-byte length prefix can describe.
pub const MAX_ENVELOPE_PAYLOAD: usize = u32::MAX as usize;

/// `{}` end-of-stream envelope.
const EMPTY_END_STREAM: &[u8] = &[envelope_flags::END_STREAM, 0, 0, 0, 2, b'{', b'}'];

/// Wrap payload in a Connect streaming envelope.
///
/// Fails with [`EnvelopeError::TooLarge`] when the payload does not fit the
/// length prefix.
pub fn wrap_envelope(payload: &[u8], compressed: bool) -> Result<Bytes, EnvelopeError> {
    let flags = if compressed {
        envelope_flags::COMPRESSED
    } else {
        envelope_flags::MESSAGE
    };
    frame(flags, payload)
}

/// Build an end-of-stream envelope, carrying `error` when the stream failed.
pub fn end_stream_envelope(error: Option<&Status>) -> Bytes {
    #[derive(Serialize)]
    struct EndStreamMessage<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a Status>,
    }

    serde_json::to_vec(&EndStreamMessage { error })
        .ok()
        .and_then(|payload| frame(envelope_flags::END_STREAM, &payload).ok())
        .unwrap_or_else(|| Bytes::from_static(EMPTY_END_STREAM))
}

/// The length prefix for a payload of `len` bytes.
pub fn payload_length(len: usize) -> Result<u32, EnvelopeError> {
    u32::try_from(len).map_err(|_| EnvelopeError::TooLarge {
        size: len,
        max: MAX_ENVELOPE_PAYLOAD,
    })
}

fn frame(flags: u8, payload: &[u8]) -> Result<Bytes, EnvelopeError> {
    let length = payload_length(payload.len())?;
    let mut frame = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&[flags]);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Parse an end-of-stream payload.
///
/// Returns the error it carries, if any. An empty payload counts as `{}`.
pub fn parse_end_stream(payload: &[u8]) -> Result<Option<Status>, EnvelopeError> {
    #[derive(Deserialize)]
    struct EndStreamJson {
        #[serde(default)]
        error: Option<Status>,
    }

    if payload.is_empty() {
        return Ok(None);
    }

    let end: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::InvalidEndStream(e.to_string()))?;
    Ok(end.error)
}

/// One decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub payload: Bytes,
}

impl Envelope {
    pub fn is_end_stream(&self) -> bool {
        self.flags == envelope_flags::END_STREAM
    }

    pub fn is_compressed(&self) -> bool {
        self.flags == envelope_flags::COMPRESSED
    }
}

/// Incremental envelope parser over a byte stream delivered in arbitrary pieces.
///
/// Feed transport chunks with [`push`](Self::push) and drain complete
/// envelopes with [`next_envelope`](Self::next_envelope). The declared length
/// of every envelope, end-of-stream included, is checked against `max_size`
/// before any payload is buffered.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    buffer: BytesMut,
    max_size: Option<usize>,
}

impl EnvelopeDecoder {
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_size,
        }
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet returned as an envelope.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete envelope, or `Ok(None)` when more bytes are needed.
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>, EnvelopeError> {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let length = length as usize;

        if !matches!(
            flags,
            envelope_flags::MESSAGE | envelope_flags::COMPRESSED | envelope_flags::END_STREAM
        ) {
            return Err(EnvelopeError::InvalidFlags(flags));
        }
        if let Some(max) = self.max_size
            && length > max
        {
            return Err(EnvelopeError::TooLarge { size: length, max });
        }

        let frame_size = ENVELOPE_HEADER_SIZE + length;
        if self.buffer.len() < frame_size {
            self.buffer.reserve(frame_size - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(ENVELOPE_HEADER_SIZE);
        let payload = self.buffer.split_to(length).freeze();
        Ok(Some(Envelope { flags, payload }))
    }

    /// Check that the stream ended on an envelope boundary.
    pub fn finish(&self) -> Result<(), EnvelopeError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(EnvelopeError::Truncated(self.buffer.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[test]
    fn test_wrap_envelope() {
        let frame = wrap_envelope(b"hello", false).unwrap();
        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");

        let frame = wrap_envelope(b"hello", true).unwrap();
        assert_eq!(frame[0], envelope_flags::COMPRESSED);
    }

    #[test]
    fn test_payload_length_fits_prefix() {
        assert_eq!(payload_length(0), Ok(0));
        assert_eq!(payload_length(MAX_ENVELOPE_PAYLOAD), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_payload_length_rejects_overflow() {
        let len = MAX_ENVELOPE_PAYLOAD + 11;
        assert_eq!(
            payload_length(len),
            Err(EnvelopeError::TooLarge {
                size: len,
                max: MAX_ENVELOPE_PAYLOAD
            })
        );
    }

    #[test]
    fn test_empty_end_stream_matches_encoder() {
        assert_eq!(end_stream_envelope(None), Bytes::from_static(EMPTY_END_STREAM));
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let result = parse_envelope_header(&[0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_end_stream_envelope_success() {
        let frame = end_stream_envelope(None);
        assert_eq!(frame[0], envelope_flags::END_STREAM);
        assert_eq!(&frame[5..], b"{}");
        assert_eq!(parse_end_stream(&frame[5..]).unwrap(), None);
    }

    #[test]
    fn test_end_stream_envelope_error() {
        let status = Status::unknown("boom");
        let frame = end_stream_envelope(Some(&status));
        assert_eq!(
            &frame[5..],
            br#"{"error":{"code":"unknown","message":"boom"}}"#
        );

        let parsed = parse_end_stream(&frame[5..]).unwrap().unwrap();
        assert_eq!(parsed.code(), Code::Unknown);
        assert_eq!(parsed.message(), Some("boom"));
    }

    #[test]
    fn test_parse_end_stream_ignores_metadata() {
        let parsed = parse_end_stream(br#"{"metadata":{"x-trace":["1"]}}"#).unwrap();
        assert!(parsed.is_none());
        assert!(parse_end_stream(b"").unwrap().is_none());
        assert!(matches!(
            parse_end_stream(b"not json"),
            Err(EnvelopeError::InvalidEndStream(_))
        ));
    }

    #[test]
    fn test_decoder_reassembles_split_frames() {
        let mut bytes = wrap_envelope(b"first", false).unwrap().to_vec();
        bytes.extend_from_slice(&wrap_envelope(b"second", false).unwrap());
        bytes.extend_from_slice(&end_stream_envelope(None));

        let mut decoder = EnvelopeDecoder::new(None);
        let mut envelopes = Vec::new();
        // Deliver one byte at a time to exercise partial headers and payloads.
        for byte in bytes {
            decoder.push(&[byte]);
            while let Some(envelope) = decoder.next_envelope().unwrap() {
                envelopes.push(envelope);
            }
        }

        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[0].payload, Bytes::from_static(b"first"));
        assert_eq!(envelopes[1].payload, Bytes::from_static(b"second"));
        assert!(envelopes[2].is_end_stream());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_rejects_oversize_before_buffering() {
        let mut decoder = EnvelopeDecoder::new(Some(4));
        decoder.push(&[0x00, 0x00, 0x00, 0x00, 0x05]);
        assert_eq!(
            decoder.next_envelope(),
            Err(EnvelopeError::TooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_decoder_limits_end_stream_before_buffering() {
        let mut decoder = EnvelopeDecoder::new(Some(1024));
        decoder.push(&[envelope_flags::END_STREAM, 0x10, 0x00, 0x00, 0x00]);
        decoder.push(&[b' '; 64]);
        assert_eq!(
            decoder.next_envelope(),
            Err(EnvelopeError::TooLarge {
                size: 0x1000_0000,
                max: 1024
            })
        );
    }

    #[test]
    fn test_decoder_accepts_end_stream_within_limit() {
        let mut decoder = EnvelopeDecoder::new(Some(2));
        decoder.push(&end_stream_envelope(None));
        let envelope = decoder.next_envelope().unwrap().unwrap();
        assert!(envelope.is_end_stream());
    }

    #[test]
    fn test_decoder_rejects_unknown_flags() {
        let mut decoder = EnvelopeDecoder::new(None);
        decoder.push(&[0x80, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(decoder.next_envelope(), Err(EnvelopeError::InvalidFlags(0x80)));
    }

    #[test]
    fn test_decoder_reports_truncation() {
        let frame = wrap_envelope(b"hello", false).unwrap();
        let mut decoder = EnvelopeDecoder::new(None);
        decoder.push(&frame[..7]);
        assert_eq!(decoder.next_envelope(), Ok(None));
        assert_eq!(decoder.finish(), Err(EnvelopeError::Truncated(7)));
    }
}
