//! Connect error codes, RPC status and the upload error taxonomy.
//!
//! - [`Code`]: Connect protocol status codes
//! - [`Status`]: code plus optional message, as carried in Connect error JSON
//! - [`UploadError`]: the classified failure surfaced by both upload roles
//! - [`EnvelopeError`]: envelope framing errors

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Connect RPC error codes, matching the codes defined in the Connect protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

/// Wire names, indexed by discriminant.
const CODE_NAMES: [(Code, &str); 17] = [
    (Code::Ok, "ok"),
    (Code::Canceled, "canceled"),
    (Code::Unknown, "unknown"),
    (Code::InvalidArgument, "invalid_argument"),
    (Code::DeadlineExceeded, "deadline_exceeded"),
    (Code::NotFound, "not_found"),
    (Code::AlreadyExists, "already_exists"),
    (Code::PermissionDenied, "permission_denied"),
    (Code::ResourceExhausted, "resource_exhausted"),
    (Code::FailedPrecondition, "failed_precondition"),
    (Code::Aborted, "aborted"),
    (Code::OutOfRange, "out_of_range"),
    (Code::Unimplemented, "unimplemented"),
    (Code::Internal, "internal"),
    (Code::Unavailable, "unavailable"),
    (Code::DataLoss, "data_loss"),
    (Code::Unauthenticated, "unauthenticated"),
];

impl Code {
    /// The snake_case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        CODE_NAMES[*self as usize].1
    }

    /// Whether this code means the caller gave up (cancellation or deadline)
    /// rather than the protocol or transport breaking.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Code::Canceled | Code::DeadlineExceeded)
    }

    /// Fallback code for an HTTP error status that came without a Connect
    /// error body.
    pub fn from_http_status(status: u16) -> Code {
        match status {
            200 => Code::Ok,
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 | 501 => Code::Unimplemented,
            408 => Code::DeadlineExceeded,
            409 => Code::AlreadyExists,
            412 => Code::FailedPrecondition,
            416 => Code::OutOfRange,
            429 => Code::ResourceExhausted,
            // nginx "client closed request"
            499 => Code::Canceled,
            500 => Code::Internal,
            502..=504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code name that is not one of the Connect codes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized code {0:?}")]
pub struct ParseCodeError(String);

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Some peers spell it the British way.
        let s = if s == "cancelled" { "canceled" } else { s };
        CODE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(code, _)| *code)
            .ok_or_else(|| ParseCodeError(s.to_owned()))
    }
}

/// RPC status: an error code with an optional human readable message.
///
/// Serializes to the Connect error JSON object:
///
/// ```json
/// {"code": "resource_exhausted", "message": "message too large"}
/// ```
///
/// # Example
///
/// ```
/// use connect_upload_core::{Code, Status};
///
/// let status = Status::unknown("connection reset");
/// assert_eq!(status.code(), Code::Unknown);
/// assert_eq!(status.to_string(), "unknown: connection reset");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// A status with no message.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for Status {}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: Code,
            #[serde(skip_serializing_if = "Option::is_none")]
            message: Option<&'a str>,
        }

        ErrorBody {
            code: self.code,
            message: self.message.as_deref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Peers may also send "details"; they carry nothing the upload needs.
        #[derive(Deserialize)]
        struct ErrorBody {
            code: String,
            #[serde(default)]
            message: Option<String>,
        }

        let body = ErrorBody::deserialize(deserializer)?;
        Ok(Status {
            code: body.code.parse().unwrap_or(Code::Unknown),
            message: body.message,
        })
    }
}

/// Classified failure of an upload session.
///
/// Each session ends in exactly one of an aggregate response or one of these.
/// A status whose code is `canceled` or `deadline_exceeded` is always filed
/// under [`UploadError::Canceled`], so callers can tell "gave up" apart from
/// "protocol broke" with a single match.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// The transport could not deliver a frame, or the upload could not be opened.
    #[error("send failed: {0}")]
    Send(Status),

    /// The transport reported an error while pulling frames or awaiting the response.
    #[error("receive failed: {0}")]
    Receive(Status),

    /// The session was canceled or ran past its deadline.
    #[error("upload canceled: {0}")]
    Canceled(Status),
}

impl UploadError {
    /// Classify a failure observed while sending.
    pub fn send(status: Status) -> Self {
        if status.code().is_cancellation() {
            UploadError::Canceled(status)
        } else {
            UploadError::Send(status)
        }
    }

    /// Classify a failure observed while receiving.
    pub fn receive(status: Status) -> Self {
        if status.code().is_cancellation() {
            UploadError::Canceled(status)
        } else {
            UploadError::Receive(status)
        }
    }

    /// Create a cancellation failure regardless of the status code.
    pub fn canceled(status: Status) -> Self {
        UploadError::Canceled(status)
    }

    /// The underlying status.
    pub fn status(&self) -> &Status {
        match self {
            UploadError::Send(status)
            | UploadError::Receive(status)
            | UploadError::Canceled(status) => status,
        }
    }

    /// Consume the error, returning the underlying status.
    pub fn into_status(self) -> Status {
        match self {
            UploadError::Send(status)
            | UploadError::Receive(status)
            | UploadError::Canceled(status) => status,
        }
    }

    pub fn code(&self) -> Code {
        self.status().code()
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, UploadError::Canceled(_))
    }
}

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Invalid frame flags.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// Declared or decompressed message size over the configured limit.
    #[error("message size {size} bytes exceeds maximum allowed size of {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// The stream ended in the middle of an envelope.
    #[error("incomplete envelope: {0} trailing bytes")]
    Truncated(usize),

    /// The end-of-stream payload was not valid JSON.
    #[error("invalid end-of-stream payload: {0}")]
    InvalidEndStream(String),

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}

impl From<EnvelopeError> for Status {
    fn from(err: EnvelopeError) -> Self {
        let code = match &err {
            EnvelopeError::TooLarge { .. } => Code::ResourceExhausted,
            EnvelopeError::Compression(_) => Code::Internal,
            _ => Code::InvalidArgument,
        };
        Status::new(code, err.to_string())
    }
}
