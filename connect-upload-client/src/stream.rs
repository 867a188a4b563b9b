//! The sending half of an HTTP upload session.

use std::future::Future;

use bytes::Bytes;
use connect_upload_core::{
    Code, CompressionEncoding, Encoding, FrameSink, Status, UploadError, UploadRequest,
    UploadResponse, end_stream_envelope, wrap_envelope,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One in-flight upload request.
///
/// Frames are encoded into envelopes and streamed as the request body while a
/// background task waits for the response. Dropping a `ClientStream` without
/// calling [`close_and_receive`](FrameSink::close_and_receive) aborts the
/// request, which the server sees as a failed upload rather than a short one.
#[derive(Debug)]
pub struct ClientStream {
    envelopes: Option<mpsc::Sender<Bytes>>,
    response: Option<JoinHandle<Result<UploadResponse, UploadError>>>,
    encoding: Encoding,
    compression: CompressionEncoding,
    deadline: Option<Instant>,
}

impl ClientStream {
    pub(crate) fn new(
        envelopes: mpsc::Sender<Bytes>,
        response: JoinHandle<Result<UploadResponse, UploadError>>,
        encoding: Encoding,
        compression: CompressionEncoding,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            envelopes: Some(envelopes),
            response: Some(response),
            encoding,
            compression,
            deadline,
        }
    }

    fn encode(&self, frame: &UploadRequest) -> Result<Bytes, UploadError> {
        let payload = self.encoding.encode(frame).map_err(UploadError::send)?;
        let (data, compressed) = self
            .compression
            .compress(payload)
            .map_err(|e| UploadError::send(e.into()))?;
        wrap_envelope(&data, compressed).map_err(|e| UploadError::send(e.into()))
    }

    /// Wait for the response task. Used once the request body can take no more.
    async fn outcome(&mut self) -> Result<UploadResponse, UploadError> {
        let Some(handle) = self.response.take() else {
            return Err(UploadError::send(Status::unavailable("upload already finished")));
        };
        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(UploadError::receive(Status::internal(format!(
                "response task failed: {err}"
            )))),
        }
    }
}

/// Run `work`, giving up once `deadline` passes.
async fn within<T>(
    deadline: Option<Instant>,
    work: impl Future<Output = Result<T, UploadError>>,
) -> Result<T, UploadError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, work)
            .await
            .unwrap_or_else(|_| {
                Err(UploadError::canceled(Status::deadline_exceeded(
                    "client timeout exceeded",
                )))
            }),
        None => work.await,
    }
}

impl FrameSink for ClientStream {
    async fn send(&mut self, frame: UploadRequest) -> Result<(), UploadError> {
        let envelope = self.encode(&frame)?;
        let Some(envelopes) = self.envelopes.clone() else {
            return Err(UploadError::send(Status::new(
                Code::FailedPrecondition,
                "upload stream already closed",
            )));
        };

        let delivered = within(self.deadline, async {
            Ok(envelopes.send(envelope).await.is_ok())
        })
        .await?;
        if delivered {
            return Ok(());
        }

        // The request body was dropped, so the exchange is over and the
        // response task knows why.
        self.envelopes = None;
        let deadline = self.deadline;
        match within(deadline, self.outcome()).await {
            Err(err) => Err(UploadError::send(err.into_status())),
            Ok(_) => Err(UploadError::send(Status::unavailable(
                "server answered before the upload finished",
            ))),
        }
    }

    async fn close_and_receive(mut self) -> Result<UploadResponse, UploadError> {
        let envelopes = self.envelopes.take();
        let deadline = self.deadline;
        within(deadline, async {
            if let Some(envelopes) = envelopes {
                // A closed body means the response task already has the outcome.
                let _ = envelopes.send(end_stream_envelope(None)).await;
            }
            self.outcome().await
        })
        .await
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        if let Some(handle) = self.response.take() {
            handle.abort();
        }
    }
}
