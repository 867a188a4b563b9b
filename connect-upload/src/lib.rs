//! Receiving side of chunked Connect uploads.
//!
//! [`UploadService`] serves `/upload.v1.UploadService/Upload` on an axum
//! [`Router`](axum::Router). Each request body is decoded into a stream of
//! frames and folded by an [`Accumulator`] into the terminal response.
//!
//! ```rust,no_run
//! use connect_upload::UploadService;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let app = UploadService::new().router();
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await
//! }
//! ```
//!
//! The [`Accumulator`] itself only needs a [`FrameSource`](connect_upload_core::FrameSource)
//! and can be driven by any transport, such as [`connect_upload_core::memory`].

mod accumulator;
mod limits;
mod protocol;
mod request;
mod response;
mod service;

pub use accumulator::{Accumulator, AccumulatorState, UploadAggregate};
pub use limits::{DEFAULT_MAX_MESSAGE_SIZE, MessageLimits};
pub use protocol::{Rejection, UploadProtocol};
pub use request::frame_stream;
pub use response::{http_error, streaming_error, streaming_response};
pub use service::UploadService;
