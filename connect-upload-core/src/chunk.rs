//! Splitting a payload into bounded frames.

use std::num::NonZeroUsize;

use bytes::Bytes;

/// Default maximum frame payload: 20 MiB.
///
/// Sits below the default 32 MiB per-message limit of the receiver.
pub const DEFAULT_FRAME_SIZE: NonZeroUsize = match NonZeroUsize::new(20 * 1024 * 1024) {
    Some(size) => size,
    None => unreachable!(),
};

/// Number of frames needed to carry `len` bytes in frames of at most `max` bytes.
///
/// `ceil(len / max)`, and zero for an empty payload.
pub fn frame_count(len: usize, max: NonZeroUsize) -> usize {
    len.div_ceil(max.get())
}

/// Split `payload` into consecutive slices of `min(max, remaining)` bytes.
///
/// The slices share the payload's buffer; nothing is copied. Concatenating
/// them in order yields `payload`.
pub fn split(payload: &Bytes, max: NonZeroUsize) -> Chunks {
    Chunks {
        remaining: payload.clone(),
        max: max.get(),
    }
}

/// Iterator returned by [`split`].
#[derive(Debug, Clone)]
pub struct Chunks {
    remaining: Bytes,
    max: usize,
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.remaining.is_empty() {
            return None;
        }
        let at = self.max.min(self.remaining.len());
        Some(self.remaining.split_to(at))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.len().div_ceil(self.max);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}
