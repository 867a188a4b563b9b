//! The contract both upload roles are written against.
//!
//! A transport hands the sending side a [`FrameSink`] and the receiving side a
//! [`FrameSource`]. Within one session frames arrive in the order they were
//! sent, none are dropped silently, and the end of the stream (`None`) is
//! distinct from a failure (`Some(Err(_))`). How frames are encoded on the wire
//! is up to the transport.
//!
//! Every method may suspend: `send` waits for back-pressure, `next_frame`
//! waits for the peer, `close_and_receive` waits for the terminal response.

use std::future::Future;

use futures::{Stream, StreamExt};

use crate::error::UploadError;
use crate::message::{UploadRequest, UploadResponse};

/// Sending half of an upload session.
pub trait FrameSink: Send {
    /// Deliver one frame. Waits while the transport applies back-pressure.
    fn send(
        &mut self,
        frame: UploadRequest,
    ) -> impl Future<Output = Result<(), UploadError>> + Send;

    /// Half-close the stream and wait for the terminal response.
    fn close_and_receive(self) -> impl Future<Output = Result<UploadResponse, UploadError>> + Send
    where
        Self: Sized;
}

/// Receiving half of an upload session.
pub trait FrameSource: Send {
    /// Pull the next frame.
    ///
    /// `None` means the sender closed the stream cleanly.
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Option<Result<UploadRequest, UploadError>>> + Send;
}

impl<S> FrameSource for S
where
    S: Stream<Item = Result<UploadRequest, UploadError>> + Unpin + Send,
{
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Option<Result<UploadRequest, UploadError>>> + Send {
        self.next()
    }
}

/// Opens upload sessions on the initiating side.
pub trait UploadTransport {
    type Sink: FrameSink;

    /// Open a new session for the upload procedure.
    fn open_upload(&self) -> impl Future<Output = Result<Self::Sink, UploadError>> + Send;
}
