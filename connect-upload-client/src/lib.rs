//! Sending side of chunked Connect uploads.
//!
//! This crate provides the [`Chunker`], which splits a payload into bounded
//! frames and streams them over any [`FrameSink`], and an HTTP transport for
//! it built on hyper, designed to talk to servers built with `connect-upload`.
//!
//! ## Features
//!
//! - Protobuf and JSON encoding
//! - Per-frame gzip compression (`compression-gzip`, on by default)
//! - HTTP/1.1, HTTP/2 over TLS, and h2c with prior knowledge
//! - Deadlines, propagated with `connect-timeout-ms` and enforced locally
//!
//! ## Example
//!
//! ```ignore
//! use connect_upload_client::UploadClient;
//!
//! let client = UploadClient::builder("http://localhost:8080")
//!     .frame_size(NonZeroUsize::new(20 * 1024 * 1024).unwrap())
//!     .build()?;
//!
//! let response = client.upload("test", payload).await?;
//! println!("server received {} bytes for {}", response.size, response.name);
//! ```
//!
//! ## Driving the chunker directly
//!
//! ```ignore
//! use connect_upload_client::Chunker;
//! use connect_upload_core::UploadTransport;
//!
//! let sink = client.open_upload().await?;
//! let response = Chunker::default()
//!     .upload_until(sink, "test", payload, cancel::signal())
//!     .await?;
//! ```

mod builder;
mod chunker;
mod client;
mod response;
mod stream;
pub mod transport;

pub use builder::{BuildError, ClientBuilder};
pub use chunker::Chunker;
pub use client::UploadClient;
pub use response::{parse_error_body, read_response};
pub use stream::ClientStream;
pub use transport::{HyperTransport, HyperTransportBuilder};

pub use connect_upload_core::{
    Code, CompressionEncoding, Encoding, FrameSink, Status, UploadError, UploadRequest,
    UploadResponse, UploadTransport, cancel,
};
