//! Shared building blocks for chunked Connect uploads.
//!
//! This crate provides the types used by both the receiving side
//! (`connect-upload`) and the sending side (`connect-upload-client`).
//!
//! ## Modules
//!
//! - `error`: Connect codes, [`Status`] and the [`UploadError`] taxonomy
//! - `envelope`: streaming envelope framing and an incremental decoder
//! - `codec`: proto / JSON message encodings
//! - `compression`: per-message compression
//! - `headers`: protocol version and deadline headers
//! - `message`: the `upload.v1` request and response messages
//! - [`chunk`]: splitting a payload into bounded frames
//! - `transport`: the [`FrameSink`] / [`FrameSource`] contract
//! - [`memory`]: an in-process transport
//! - [`cancel`]: deadlines and interrupts

pub mod cancel;
pub mod chunk;
mod codec;
mod compression;
mod envelope;
mod error;
mod headers;
pub mod memory;
mod message;
mod transport;

pub use codec::*;
pub use compression::*;
pub use envelope::*;
pub use error::*;
pub use headers::*;
pub use message::*;
pub use transport::*;
