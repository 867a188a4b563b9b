//! Sending-side role: split a payload into frames and stream them.

use std::future::Future;
use std::num::NonZeroUsize;

use bytes::Bytes;
use connect_upload_core::chunk::{self, DEFAULT_FRAME_SIZE};
use connect_upload_core::{FrameSink, Status, UploadError, UploadRequest, UploadResponse, cancel};

/// Streams one payload as an ordered sequence of bounded frames.
///
/// Every frame carries the same name and at most `max_frame_size` bytes of
/// data; concatenating the data of all frames in order gives back the payload.
/// An empty payload sends no frames at all and still closes the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
    max_frame_size: NonZeroUsize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

impl Chunker {
    pub fn new(max_frame_size: NonZeroUsize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> NonZeroUsize {
        self.max_frame_size
    }

    /// Send `payload` over `sink`, then close and wait for the response.
    ///
    /// Each frame waits for the transport to accept it. The first send
    /// failure abandons the rest of the payload and is returned as is; the
    /// sink is dropped without closing, which aborts the session.
    pub async fn upload<S>(
        &self,
        mut sink: S,
        name: &str,
        payload: Bytes,
    ) -> Result<UploadResponse, UploadError>
    where
        S: FrameSink,
    {
        let frames = chunk::frame_count(payload.len(), self.max_frame_size);
        tracing::debug!(name, bytes = payload.len(), frames, "starting upload");

        for (index, data) in chunk::split(&payload, self.max_frame_size).enumerate() {
            let len = data.len();
            sink.send(UploadRequest {
                name: name.to_owned(),
                data,
            })
            .await?;
            tracing::debug!(frame = index + 1, of = frames, "sent {len} bytes");
        }

        sink.close_and_receive().await
    }

    /// Like [`upload`](Self::upload), but gives up as soon as `interrupt` fires.
    ///
    /// No frame is sent after the interrupt; the result is
    /// [`UploadError::Canceled`] with the interrupt's status.
    pub async fn upload_until<S, I>(
        &self,
        sink: S,
        name: &str,
        payload: Bytes,
        interrupt: I,
    ) -> Result<UploadResponse, UploadError>
    where
        S: FrameSink,
        I: Future<Output = Status>,
    {
        cancel::until(self.upload(sink, name, payload), interrupt).await
    }
}
