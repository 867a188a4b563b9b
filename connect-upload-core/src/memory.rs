//! In-process transport over bounded channels.
//!
//! [`connect`] returns a connector for the sending side and a listener for the
//! receiving side. Each session gets its own frame channel of the configured
//! capacity, so a slow receiver applies back-pressure to `send`.
//!
//! ```
//! # async fn demo() -> Result<(), connect_upload_core::UploadError> {
//! use connect_upload_core::memory;
//! use connect_upload_core::{
//!     FrameSink, FrameSource, UploadRequest, UploadResponse, UploadTransport,
//! };
//!
//! let (connector, mut listener) = memory::connect(4);
//!
//! let receiver = tokio::spawn(async move {
//!     let session = listener.accept().await.unwrap();
//!     let (mut source, responder) = session.into_parts();
//!     let mut size = 0;
//!     while let Some(Ok(frame)) = source.next_frame().await {
//!         size += frame.data.len() as i64;
//!     }
//!     responder.respond(Ok(UploadResponse { name: "demo".into(), size }));
//! });
//!
//! let mut sink = connector.open_upload().await?;
//! sink.send(UploadRequest { name: "demo".into(), data: vec![1, 2, 3].into() }).await?;
//! let response = sink.close_and_receive().await?;
//! assert_eq!(response.size, 3);
//! # receiver.await.unwrap();
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Status, UploadError};
use crate::message::{UploadRequest, UploadResponse};
use crate::transport::{FrameSink, UploadTransport};

type Reply = Result<UploadResponse, Status>;

/// Create a connected transport pair.
///
/// `capacity` bounds the number of frames in flight per session; zero is
/// treated as one.
pub fn connect(capacity: usize) -> (MemoryConnector, MemoryListener) {
    let (sessions_tx, sessions_rx) = mpsc::channel(1);
    let capacity = capacity.max(1);
    (
        MemoryConnector {
            sessions: sessions_tx,
            capacity,
        },
        MemoryListener {
            sessions: sessions_rx,
        },
    )
}

/// Initiating side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    sessions: mpsc::Sender<MemorySession>,
    capacity: usize,
}

impl UploadTransport for MemoryConnector {
    type Sink = MemorySink;

    async fn open_upload(&self) -> Result<MemorySink, UploadError> {
        let (frames_tx, frames_rx) = mpsc::channel(self.capacity);
        let (reply_tx, reply_rx) = oneshot::channel();
        let closed = Arc::new(AtomicBool::new(false));

        let session = MemorySession {
            source: MemorySource {
                frames: frames_rx,
                closed: closed.clone(),
                finished: false,
            },
            responder: MemoryResponder { reply: reply_tx },
        };
        self.sessions
            .send(session)
            .await
            .map_err(|_| UploadError::send(Status::unavailable("listener closed")))?;

        Ok(MemorySink {
            frames: frames_tx,
            closed,
            reply: reply_rx,
        })
    }
}

/// Accepting side of the in-memory transport.
#[derive(Debug)]
pub struct MemoryListener {
    sessions: mpsc::Receiver<MemorySession>,
}

impl MemoryListener {
    /// Wait for the next session. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemorySession> {
        self.sessions.recv().await
    }
}

/// A session accepted by a [`MemoryListener`].
#[derive(Debug)]
pub struct MemorySession {
    source: MemorySource,
    responder: MemoryResponder,
}

impl MemorySession {
    pub fn into_parts(self) -> (MemorySource, MemoryResponder) {
        (self.source, self.responder)
    }
}

/// Delivers the terminal outcome of a session back to its sender.
#[derive(Debug)]
pub struct MemoryResponder {
    reply: oneshot::Sender<Reply>,
}

impl MemoryResponder {
    /// Send the terminal outcome. Ignored if the sender already went away.
    pub fn respond(self, outcome: Result<UploadResponse, UploadError>) {
        let _ = self.reply.send(outcome.map_err(UploadError::into_status));
    }
}

/// Sending half of an in-memory session.
#[derive(Debug)]
pub struct MemorySink {
    frames: mpsc::Sender<UploadRequest>,
    closed: Arc<AtomicBool>,
    reply: oneshot::Receiver<Reply>,
}

impl FrameSink for MemorySink {
    async fn send(&mut self, frame: UploadRequest) -> Result<(), UploadError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| UploadError::send(Status::unavailable("receiver closed the upload")))
    }

    async fn close_and_receive(self) -> Result<UploadResponse, UploadError> {
        // Mark the close before the channel disconnects so the source can tell
        // a clean end from a dropped sink.
        self.closed.store(true, Ordering::Release);
        drop(self.frames);

        match self.reply.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(status)) => Err(UploadError::receive(status)),
            Err(_) => Err(UploadError::receive(Status::unavailable(
                "receiver dropped the upload without responding",
            ))),
        }
    }
}

/// Receiving half of an in-memory session.
#[derive(Debug)]
pub struct MemorySource {
    frames: mpsc::Receiver<UploadRequest>,
    closed: Arc<AtomicBool>,
    finished: bool,
}

impl Stream for MemorySource {
    type Item = Result<UploadRequest, UploadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.frames.poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => {
                self.finished = true;
                if self.closed.load(Ordering::Acquire) {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(UploadError::canceled(Status::cancelled(
                        "sender dropped the upload without closing",
                    )))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
