//! `upload.v1` messages.
//!
//! ```proto
//! package upload.v1;
//!
//! service UploadService {
//!   rpc Upload(stream UploadRequest) returns (UploadResponse);
//! }
//!
//! message UploadRequest {
//!   string name = 1;
//!   bytes data = 2;
//! }
//!
//! message UploadResponse {
//!   string name = 1;
//!   int64 size = 2;
//! }
//! ```
//!
//! The JSON form follows the protobuf JSON mapping: `bytes` as base64 and
//! `int64` as a decimal string.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Fully-qualified service name.
pub const UPLOAD_SERVICE: &str = "upload.v1.UploadService";

/// HTTP path of the client-streaming upload procedure.
pub const UPLOAD_PROCEDURE: &str = "/upload.v1.UploadService/Upload";

/// One frame of an upload: a slice of the payload tagged with the upload name.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "bytes", tag = "2")]
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

/// Terminal response: the last name seen and the total number of bytes received.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    #[serde(with = "int64_string")]
    pub size: i64,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        // Parsers accept either alphabet, padded or not.
        [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(&encoded).ok())
            .map(Bytes::from)
            .ok_or_else(|| D::Error::custom("invalid base64 in bytes field"))
    }
}

mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64Json {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Option::<Int64Json>::deserialize(deserializer)? {
            None => Ok(0),
            Some(Int64Json::Number(n)) => Ok(n),
            Some(Int64Json::Text(s)) => s
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid int64 value: {s:?}"))),
        }
    }
}
