use crate::cell::State;
use crate::error::Error;
use crate::timer::{self, TimerGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cooperative one-shot cancellation token.
///
/// Clones share the same underlying signal. Cancellation is advisory: work
/// observing the token is expected to stop, nothing is forcibly interrupted.
/// Built on the same single-assignment cell as promises, so waiters and
/// subscribers get the identical broadcast guarantees.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<State<()>>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::new()),
        }
    }

    /// Fires the token. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.state.set(Err(Error::Cancelled))
    }

    /// Schedules `cancel` after `delay` on the process-wide timer.
    ///
    /// Dropping the returned guard does not stop the timer; call
    /// [`TimerGuard::stop`] to revoke an unfired cancellation.
    pub fn cancel_after(&self, delay: Duration) -> TimerGuard {
        let token = self.clone();
        timer::global().schedule(
            delay,
            Box::new(move || {
                token.cancel();
            }),
        )
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_settled()
    }

    /// Registers a callback invoked exactly once when the token fires.
    ///
    /// Runs inline when the token is already cancelled, otherwise on the
    /// cancelling thread.
    pub fn subscribe(&self, f: impl FnOnce() + Send + 'static) {
        self.state.subscribe(Box::new(move |_| f()));
    }

    /// Derives a token that fires when this one does.
    ///
    /// The child can also be cancelled on its own without affecting the
    /// parent. A child derived from an already-cancelled token starts out
    /// cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let fire = child.clone();
        self.subscribe(move || {
            fire.cancel();
        });
        child
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
