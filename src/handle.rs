use tokio::sync::oneshot;

use crate::error::DebounceError;

/// Outcome of one coalescing session, fanned out to every caller that
/// joined it.
pub type Outcome = Result<(), DebounceError>;

/// Single-slot receiver through which one caller observes the outcome of
/// the session its trigger joined.
///
/// Dropping the handle abandons the slot; the session's delivery is
/// non-blocking either way.
#[derive(Debug)]
pub struct Handle {
    rx: oneshot::Receiver<Outcome>,
}

impl Handle {
    pub(crate) fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        Self { rx }
    }

    /// Wait for the session's outcome.
    ///
    /// Resolves to [`DebounceError::Cancelled`] if the session went away
    /// without delivering (e.g. the wrapped action panicked), so no handle
    /// is left pending forever.
    pub async fn outcome(self) -> Outcome {
        self.rx.await.unwrap_or(Err(DebounceError::Cancelled))
    }
}
