//! Upper bound on a single incoming frame.
//!
//! The bound applies to the length declared in each envelope header, before
//! any payload is buffered, and again to the decompressed message.

/// 32 MiB: room for the 20 MiB frames the sender emits by default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// How large a single upload frame may be.
///
/// ```rust
/// use connect_upload::MessageLimits;
///
/// assert_eq!(MessageLimits::default().max_message_size(), Some(32 * 1024 * 1024));
/// assert_eq!(MessageLimits::new(1024).max_message_size(), Some(1024));
/// assert_eq!(MessageLimits::unlimited().max_message_size(), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageLimits(Option<usize>);

impl Default for MessageLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl MessageLimits {
    /// Reject frames over `bytes`.
    pub fn new(bytes: usize) -> Self {
        Self(Some(bytes))
    }

    /// Accept frames of any size.
    ///
    /// A hostile envelope header can then claim up to 4 GiB, all of which
    /// is buffered before the frame is decoded.
    pub fn unlimited() -> Self {
        Self(None)
    }

    pub fn max_message_size(&self) -> Option<usize> {
        self.0
    }
}
