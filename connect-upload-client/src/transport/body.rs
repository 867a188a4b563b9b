//! Request body fed by an upload session.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pin_project! {
    /// Streaming request body.
    ///
    /// Yields the envelopes pushed into the paired sender, and ends once every
    /// sender is dropped. Capacity of the channel bounds how far the session can
    /// run ahead of the connection.
    pub struct TransportBody {
        #[pin]
        envelopes: ReceiverStream<Bytes>,
    }
}

impl TransportBody {
    /// Create a body and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            TransportBody {
                envelopes: ReceiverStream::new(rx),
            },
        )
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project().envelopes.poll_next(cx) {
            Poll::Ready(Some(data)) => Poll::Ready(Some(Ok(Frame::data(data)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_body_yields_sent_chunks_then_ends() {
        let (tx, body) = TransportBody::channel(4);
        tx.send(Bytes::from("chunk1")).await.unwrap();
        tx.send(Bytes::from("chunk2")).await.unwrap();
        drop(tx);

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from("chunk1chunk2"));
    }

    #[tokio::test]
    async fn test_dropped_body_closes_sender() {
        let (tx, body) = TransportBody::channel(1);
        drop(body);
        assert!(tx.send(Bytes::from("late")).await.is_err());
    }
}
