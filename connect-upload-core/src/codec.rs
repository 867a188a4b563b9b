//! Message encodings for Connect streaming.
//!
//! The streaming content type selects how each envelope payload is encoded:
//! `application/connect+proto` uses the protobuf binary format and
//! `application/connect+json` the protobuf JSON mapping.

use bytes::Bytes;
use prost::Message;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::Status;

/// Streaming content type for protobuf-encoded messages.
pub const CONTENT_TYPE_PROTO: &str = "application/connect+proto";

/// Streaming content type for JSON-encoded messages.
pub const CONTENT_TYPE_JSON: &str = "application/connect+json";

/// Payload encoding of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Proto,
    Json,
}

impl Encoding {
    /// Detect the encoding from a `Content-Type` header value.
    ///
    /// Parameters such as `; charset=utf-8` are ignored. Returns `None` for
    /// anything that is not a Connect streaming content type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        if media_type.eq_ignore_ascii_case(CONTENT_TYPE_PROTO) {
            Some(Self::Proto)
        } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            Some(Self::Json)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Proto => CONTENT_TYPE_PROTO,
            Self::Json => CONTENT_TYPE_JSON,
        }
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Self::Proto)
    }

    /// Encode a message as an envelope payload.
    pub fn encode<T>(&self, message: &T) -> Result<Bytes, Status>
    where
        T: Message + Serialize,
    {
        match self {
            Self::Proto => Ok(Bytes::from(message.encode_to_vec())),
            Self::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| Status::internal(format!("failed to encode message: {e}"))),
        }
    }

    /// Decode a message from an envelope payload.
    pub fn decode<T>(&self, payload: &[u8]) -> Result<T, Status>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self {
            Self::Proto => T::decode(payload)
                .map_err(|e| Status::invalid_argument(format!("failed to decode message: {e}"))),
            Self::Json => serde_json::from_slice(payload)
                .map_err(|e| Status::invalid_argument(format!("failed to decode message: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use crate::message::UploadRequest;

    #[test]
    fn test_from_content_type() {
        assert_eq!(
            Encoding::from_content_type("application/connect+proto"),
            Some(Encoding::Proto)
        );
        assert_eq!(
            Encoding::from_content_type("application/connect+json; charset=utf-8"),
            Some(Encoding::Json)
        );
        assert_eq!(Encoding::from_content_type("application/json"), None);
        assert_eq!(Encoding::from_content_type("text/plain"), None);
    }

    #[test]
    fn test_from_content_type_needs_exact_media_type() {
        assert_eq!(
            Encoding::from_content_type("Application/Connect+Proto"),
            Some(Encoding::Proto)
        );
        assert_eq!(Encoding::from_content_type("application/connect+protobuf"), None);
        assert_eq!(Encoding::from_content_type("application/connect+jsonx"), None);
        assert_eq!(
            Encoding::from_content_type("application/connect+json ;charset=utf-8"),
            Some(Encoding::Json)
        );
    }

    #[test]
    fn test_proto_and_json_decode_to_same_message() {
        let request = UploadRequest {
            name: "test".into(),
            data: Bytes::from_static(b"\x42\x69"),
        };

        for encoding in [Encoding::Proto, Encoding::Json] {
            let payload = encoding.encode(&request).unwrap();
            let decoded: UploadRequest = encoding.decode(&payload).unwrap();
            assert_eq!(decoded, request, "{encoding:?}");
        }
    }

    #[test]
    fn test_decode_garbage_is_invalid_argument() {
        let err = Encoding::Json
            .decode::<UploadRequest>(b"{not json")
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        // Field 1 declared as a 10-byte string with only 1 byte present.
        let err = Encoding::Proto
            .decode::<UploadRequest>(&[0x0a, 0x0a, b'x'])
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }
}
