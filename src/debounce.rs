use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::DebounceError;
use crate::handle::{Handle, Outcome};

type Action = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type OutcomeTx = oneshot::Sender<Outcome>;

/// Coalesces bursts of [`trigger`] calls into a single run of the wrapped
/// action once no new trigger has arrived for `timeout`.
///
/// All callers that joined a burst observe the same outcome through the
/// [`Handle`] returned by their trigger call.
///
/// [`trigger`]: Debouncer::trigger
pub struct Debouncer {
    action: Arc<Action>,
    timeout: Duration,
    /// Gateway half of the request intake. The receiver half lives behind a
    /// mutex so consecutive sessions can take turns draining it.
    intake_tx: mpsc::Sender<OutcomeTx>,
    intake_rx: Arc<Mutex<mpsc::Receiver<OutcomeTx>>>,
    /// Single-permit guard: held for exactly the lifetime of one session.
    active: Arc<Semaphore>,
}

impl Debouncer {
    /// Create a new `Debouncer` wrapping `action` with the given quiescence
    /// period.
    pub fn new<F>(action: F, timeout: Duration) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let (intake_tx, intake_rx) = mpsc::channel(1);
        Self {
            action: Arc::new(action),
            timeout,
            intake_tx,
            intake_rx: Arc::new(Mutex::new(intake_rx)),
            active: Arc::new(Semaphore::new(1)),
        }
    }

    /// The quiescence period after the last trigger before the action runs.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a run of the wrapped action.
    ///
    /// Starts a coalescing session if none is active, otherwise joins the
    /// one in flight. Returns once the request has been accepted by a
    /// session's intake; await the returned [`Handle`] for the outcome.
    ///
    /// `cancel` is bound to the session this call starts, if it starts one.
    /// Cancelling that token resolves every caller coalesced into the
    /// session with [`DebounceError::Cancelled`].
    pub async fn trigger(&self, cancel: CancellationToken) -> Handle {
        let (tx, rx) = oneshot::channel();
        if let Ok(permit) = Arc::clone(&self.active).try_acquire_owned() {
            let session = Session {
                action: Arc::clone(&self.action),
                timeout: self.timeout,
                intake: Arc::clone(&self.intake_rx),
            };
            tokio::spawn(async move {
                session.run(cancel).await;
                drop(permit);
            });
        }
        // Hand the request to whichever session is (or is about to be)
        // draining the intake. The receiver half lives on `self`, so the
        // channel cannot be closed from here.
        let _ = self.intake_tx.send(tx).await;
        Handle::new(rx)
    }
}

/// One coalescing cycle: lives from the trigger that started it until the
/// action fires or the session is cancelled.
struct Session {
    action: Arc<Action>,
    timeout: Duration,
    intake: Arc<Mutex<mpsc::Receiver<OutcomeTx>>>,
}

impl Session {
    /// Single control loop multiplexing request intake, cancellation, and
    /// timer expiry, then fanning the one outcome out to every caller that
    /// joined.
    async fn run(self, cancel: CancellationToken) {
        // Only ever contended for the instant between sessions: the permit
        // admits one session at a time.
        let mut intake = self.intake.lock().await;
        let mut callers: Vec<OutcomeTx> = Vec::new();

        // The spawning trigger sends its request right behind the spawn, so
        // this resolves promptly. Cancellation is not consulted until that
        // request is accumulated; otherwise a pre-cancelled spawner's handle
        // would be stranded in the intake.
        match intake.recv().await {
            Some(tx) => callers.push(tx),
            None => return,
        }
        debug!(timeout = ?self.timeout, "debounce session started");

        let timer = sleep(self.timeout);
        tokio::pin!(timer);

        let outcome: Outcome = loop {
            tokio::select! {
                biased;
                Some(tx) = intake.recv() => {
                    callers.push(tx);
                    // Resetting rearms the sleep even if it already elapsed
                    // unobserved; no stale expiry survives to fire early.
                    timer.as_mut().reset(Instant::now() + self.timeout);
                    trace!(callers = callers.len(), "trigger joined; timer reset");
                }
                _ = cancel.cancelled() => {
                    debug!(callers = callers.len(), "debounce session cancelled");
                    break Err(DebounceError::Cancelled);
                }
                () = &mut timer => {
                    debug!(callers = callers.len(), "quiet period elapsed; running action");
                    break (self.action)().map_err(|e| DebounceError::Action(Arc::new(e)));
                }
            }
        };

        // Non-blocking delivery; a caller that dropped its handle is skipped.
        for tx in callers {
            let _ = tx.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn coalesces_burst_into_single_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let d = Debouncer::new(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            },
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();

        let h1 = d.trigger(cancel.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "fired before quiet period");
        let h2 = d.trigger(cancel.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "stale deadline fired");
        let h3 = d.trigger(cancel.clone()).await;

        for h in [h1, h2, h3] {
            match h.outcome().await {
                Err(DebounceError::Action(e)) => assert_eq!(e.to_string(), "boom"),
                other => panic!("expected action error, got {other:?}"),
            }
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fires_once_per_quiet_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let d = Debouncer::new(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(10),
        );
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            d.trigger(cancel.clone()).await.outcome().await.unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn pre_cancelled_trigger_resolves_without_waiting() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let d = Debouncer::new(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_secs(3600),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = d.trigger(cancel).await.outcome().await;
        assert!(matches!(outcome, Err(DebounceError::Cancelled)));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timeout_matches_construction() {
        let d = Debouncer::new(|| Ok(()), Duration::from_millis(50));
        assert_eq!(d.timeout(), Duration::from_millis(50));
    }
}
