//! Receiving-side state machine.
//!
//! ```text
//!                 frame                      merged
//! AwaitingFrame ─────────▶ Aggregating ─────────────▶ AwaitingFrame
//!       │
//!       ├── end of stream ──▶ Complete   (aggregate returned)
//!       └── failure ────────▶ Failed     (aggregate discarded)
//! ```
//!
//! A session produces exactly one outcome: the aggregate, or one classified
//! [`UploadError`].

use std::future::Future;

use connect_upload_core::{
    FrameSource, Status, UploadError, UploadRequest, UploadResponse, cancel,
};

/// Where an [`Accumulator`] is in its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulatorState {
    AwaitingFrame,
    Aggregating,
    Complete,
    Failed,
}

impl AccumulatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Running result of an upload: the last name seen and the bytes received.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadAggregate {
    pub name: String,
    pub size: u64,
}

impl UploadAggregate {
    fn merge(&mut self, frame: UploadRequest) {
        // Last write wins; frames of one upload normally repeat the same name.
        self.name = frame.name;
        self.size = self.size.saturating_add(frame.data.len() as u64);
    }
}

impl From<UploadAggregate> for UploadResponse {
    fn from(aggregate: UploadAggregate) -> Self {
        UploadResponse {
            name: aggregate.name,
            size: i64::try_from(aggregate.size).unwrap_or(i64::MAX),
        }
    }
}

/// Folds a stream of frames into one [`UploadAggregate`].
///
/// # Example
///
/// ```
/// # async fn demo() {
/// use connect_upload::Accumulator;
/// use connect_upload_core::{UploadError, UploadRequest};
///
/// let frames = vec![
///     Ok::<_, UploadError>(UploadRequest { name: "test".into(), data: vec![0; 20].into() }),
///     Ok(UploadRequest { name: "test".into(), data: vec![0; 10].into() }),
/// ];
/// let mut source = futures::stream::iter(frames);
///
/// let aggregate = Accumulator::new().run(&mut source).await.unwrap();
/// assert_eq!(aggregate.size, 30);
/// # }
/// ```
#[derive(Debug)]
pub struct Accumulator {
    state: AccumulatorState,
    aggregate: UploadAggregate,
    frames: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::AwaitingFrame,
            aggregate: UploadAggregate::default(),
            frames: 0,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Pull frames from `source` until it ends or fails.
    ///
    /// A zero-frame stream is valid and yields an empty name and size 0.
    pub async fn run<S>(mut self, source: &mut S) -> Result<UploadAggregate, UploadError>
    where
        S: FrameSource,
    {
        loop {
            let event = source.next_frame().await;
            if let Some(outcome) = self.advance(event) {
                return outcome;
            }
        }
    }

    /// Like [`run`](Self::run), but gives up as soon as `interrupt` fires.
    ///
    /// On interruption the partial aggregate is dropped and the result is
    /// [`UploadError::Canceled`].
    pub async fn run_until<S, I>(
        self,
        source: &mut S,
        interrupt: I,
    ) -> Result<UploadAggregate, UploadError>
    where
        S: FrameSource,
        I: Future<Output = Status>,
    {
        cancel::until(self.run(source), interrupt).await
    }

    /// Apply one pull result. Returns the outcome once the session is terminal.
    fn advance(
        &mut self,
        event: Option<Result<UploadRequest, UploadError>>,
    ) -> Option<Result<UploadAggregate, UploadError>> {
        debug_assert_eq!(self.state, AccumulatorState::AwaitingFrame);

        match event {
            Some(Ok(frame)) => {
                self.state = AccumulatorState::Aggregating;
                let len = frame.data.len();
                self.aggregate.merge(frame);
                self.frames += 1;
                tracing::debug!(
                    name = %self.aggregate.name,
                    bytes = len,
                    total = self.aggregate.size,
                    "received frame {}",
                    self.frames
                );
                self.state = AccumulatorState::AwaitingFrame;
                None
            }
            None => {
                self.state = AccumulatorState::Complete;
                tracing::debug!(frames = self.frames, "upload stream complete");
                Some(Ok(std::mem::take(&mut self.aggregate)))
            }
            Some(Err(err)) => {
                self.state = AccumulatorState::Failed;
                tracing::debug!(
                    frames = self.frames,
                    "upload stream failed, discarding {} bytes: {err}",
                    self.aggregate.size
                );
                self.aggregate = UploadAggregate::default();
                Some(Err(err))
            }
        }
    }
}
