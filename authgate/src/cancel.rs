//! Cancellation of pending collaborator and storage calls.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The caller's cancellation token fired before the operation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Run `future` unless `cancel` fires first.
///
/// A token that is already cancelled wins even if the future is immediately ready.
/// The future is dropped on cancellation.
pub async fn until_cancelled<F>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Cancelled),
        output = future => Ok(output),
    }
}

/// Fail if `cancel` has already fired.
///
/// Used before a write that must not be abandoned halfway: the write itself then
/// runs to completion.
pub fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
