//! External cancellation of upload sessions.
//!
//! An interrupt is any future that resolves to the [`Status`] describing why
//! the session was abandoned. [`until`] races a session against it.

use std::future::Future;
use std::time::Duration;

use crate::error::{Status, UploadError};

/// Run `work` until it finishes or `interrupt` fires, whichever comes first.
///
/// When the interrupt wins, `work` is dropped at its current suspension point,
/// which releases whatever transport stream it held, and the interrupt's status
/// is returned as [`UploadError::Canceled`].
pub async fn until<T, F, I>(work: F, interrupt: I) -> Result<T, UploadError>
where
    F: Future<Output = Result<T, UploadError>>,
    I: Future<Output = Status>,
{
    tokio::select! {
        biased;

        status = interrupt => Err(UploadError::canceled(status)),
        result = work => result,
    }
}

/// Interrupt that fires after `timeout` with `deadline_exceeded`.
pub async fn deadline(timeout: Duration) -> Status {
    tokio::time::sleep(timeout).await;
    Status::deadline_exceeded(format!("deadline of {}ms exceeded", timeout.as_millis()))
}

/// Interrupt that fires on Ctrl-C with `canceled`.
///
/// If the signal handler cannot be installed the interrupt never fires.
pub async fn signal() -> Status {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Status::cancelled("interrupted"),
        Err(err) => {
            tracing::warn!("failed to install Ctrl-C handler: {err}");
            never().await
        }
    }
}

/// Interrupt that never fires.
pub async fn never() -> Status {
    std::future::pending().await
}
