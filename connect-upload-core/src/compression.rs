//! Per-message (envelope) compression.
//!
//! Compression is negotiated with the `connect-content-encoding` header and
//! applied to each envelope payload independently. Identity is always
//! available; gzip requires the `compression-gzip` feature.

use bytes::Bytes;

use crate::error::EnvelopeError;

#[cfg(feature = "compression-gzip")]
use flate2::{Compression as GzipLevel, read::GzDecoder, write::GzEncoder};
#[cfg(feature = "compression-gzip")]
use std::io::{Read, Write};

/// Header carrying the per-message encoding of a streaming request or response.
pub const CONNECT_CONTENT_ENCODING: &str = "connect-content-encoding";

/// Header advertising the encodings a peer accepts for streaming messages.
pub const CONNECT_ACCEPT_ENCODING: &str = "connect-accept-encoding";

/// Supported compression encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionEncoding {
    #[default]
    Identity,
    #[cfg(feature = "compression-gzip")]
    Gzip,
}

impl CompressionEncoding {
    /// Parse from a `connect-content-encoding` header value.
    /// Returns None for unsupported encodings (caller should return Unimplemented).
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("identity") | Some("") => Some(Self::Identity),
            #[cfg(feature = "compression-gzip")]
            Some("gzip") => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Get the header value string for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => "gzip",
        }
    }

    /// Comma separated list of every encoding this build can decode.
    pub fn supported() -> &'static str {
        #[cfg(feature = "compression-gzip")]
        {
            "gzip,identity"
        }
        #[cfg(not(feature = "compression-gzip"))]
        {
            "identity"
        }
    }

    /// Returns true if this encoding is identity (no compression).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Compress a message payload.
    ///
    /// Returns `(bytes, compressed)`; identity passes the payload through and
    /// reports `false` so the envelope is flagged as a plain message.
    pub fn compress(&self, payload: Bytes) -> Result<(Bytes, bool), EnvelopeError> {
        match self {
            Self::Identity => Ok((payload, false)),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::default());
                encoder
                    .write_all(&payload)
                    .map_err(|e| EnvelopeError::Compression(e.to_string()))?;
                let compressed = encoder
                    .finish()
                    .map_err(|e| EnvelopeError::Compression(e.to_string()))?;
                Ok((Bytes::from(compressed), true))
            }
        }
    }

    /// Decompress a message payload, refusing to inflate past `max` bytes.
    pub fn decompress(&self, payload: Bytes, max: Option<usize>) -> Result<Bytes, EnvelopeError> {
        match self {
            // A compressed flag under identity encoding is a peer error.
            Self::Identity => Err(EnvelopeError::Decompression(
                "received compressed message without connect-content-encoding".into(),
            )),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => {
                let decoder = GzDecoder::new(&payload[..]);
                let mut out = Vec::new();
                match max {
                    Some(max) => {
                        decoder
                            .take(max as u64 + 1)
                            .read_to_end(&mut out)
                            .map_err(|e| EnvelopeError::Decompression(e.to_string()))?;
                        if out.len() > max {
                            return Err(EnvelopeError::TooLarge {
                                size: out.len(),
                                max,
                            });
                        }
                    }
                    None => {
                        let mut decoder = decoder;
                        decoder
                            .read_to_end(&mut out)
                            .map_err(|e| EnvelopeError::Decompression(e.to_string()))?;
                    }
                }
                Ok(Bytes::from(out))
            }
        }
    }
}
