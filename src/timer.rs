use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Fire-once callback scheduling.
///
/// The crate only needs a single operation from a clock: run a callback
/// after a delay unless stopped first. The default implementation parks a
/// dedicated thread; alternative clocks (mock time, timer wheels) implement
/// the same trait.
pub trait Timer: Send + Sync {
    /// Schedules `f` to run once after `delay`.
    ///
    /// The returned guard revokes the callback if stopped before the delay
    /// elapses; stopping after the fire is a no-op.
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> TimerGuard;
}

/// Handle to a scheduled callback.
pub struct TimerGuard {
    inner: Arc<GuardInner>,
}

#[derive(Default)]
struct GuardInner {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl TimerGuard {
    /// Prevents an unfired callback from running and wakes the timer early.
    pub fn stop(&self) {
        let mut stopped = self
            .inner
            .stopped
            .lock()
            .expect("TimerGuard::stop: lock poisoned");
        *stopped = true;
        self.inner.cv.notify_all();
    }
}

/// Default [`Timer`] backed by one thread per scheduled callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> TimerGuard {
        let inner = Arc::new(GuardInner::default());
        let guard = TimerGuard {
            inner: Arc::clone(&inner),
        };
        thread::Builder::new()
            .name("dagflow-timer".into())
            .spawn(move || {
                let stopped = {
                    let stopped = inner.stopped.lock().expect("ThreadTimer: lock poisoned");
                    let (stopped, _) = inner
                        .cv
                        .wait_timeout_while(stopped, delay, |stopped| !*stopped)
                        .expect("ThreadTimer: lock poisoned");
                    *stopped
                };
                if !stopped {
                    f();
                }
            })
            .expect("ThreadTimer: failed to spawn timer thread");
        guard
    }
}

/// Process-wide timer used by the combinators.
pub(crate) fn global() -> &'static dyn Timer {
    static TIMER: ThreadTimer = ThreadTimer;
    &TIMER
}
