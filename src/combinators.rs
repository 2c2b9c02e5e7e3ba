use crate::catch::catch;
use crate::error::{Error, Outcome};
use crate::executor::{self, Executor};
use crate::future::{Future, Promise};
use crate::sync::{AtomicBool, AtomicUsize, Ordering};
use crate::timer;
use crate::token::CancelToken;
use crate::types::SyncUnsafeCell;
use std::sync::Arc;
use std::time::Duration;

/// An already-settled future carrying `value`.
pub fn done<T: Send + Sync + 'static>(value: T) -> Future<T> {
    done_with(Ok(value))
}

/// An already-settled future carrying an arbitrary outcome.
pub fn done_with<T: Send + Sync + 'static>(outcome: Outcome<T>) -> Future<T> {
    let promise = Promise::new();
    promise.set(outcome);
    promise.future()
}

/// Runs `f` on the process-wide default executor.
///
/// The returned future settles with `f`'s outcome; panics are caught and
/// converted to [`Error::Panic`].
pub fn spawn<T>(f: impl FnOnce() -> Outcome<T> + Send + 'static) -> Future<T>
where
    T: Send + Sync + 'static,
{
    submit_to(&*executor::global(), f)
}

/// Runs `f` on the given executor.
///
/// The promise behind the returned future is settled on every exit path of
/// `f`, including abnormal termination.
pub fn submit_to<T>(executor: &dyn Executor, f: impl FnOnce() -> Outcome<T> + Send + 'static) -> Future<T>
where
    T: Send + Sync + 'static,
{
    let promise = Promise::new();
    let result = promise.future();
    executor.submit(Box::new(move || {
        promise.set(catch(f));
    }));
    result
}

/// Chains a transformation onto `source`.
///
/// `f` receives the source outcome (value or error) and its return value
/// settles the derived future. Runs on the thread that settled `source`.
pub fn then<T, R>(
    source: &Future<T>,
    f: impl FnOnce(Outcome<T>) -> Outcome<R> + Send + 'static,
) -> Future<R>
where
    T: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    let promise = Promise::new();
    let result = promise.future();
    source.subscribe(move |outcome| promise.set(f(outcome.clone())));
    result
}

struct Gather<T> {
    /// One slot per source; written exactly once by that source's
    /// continuation before the release decrement of `remaining`.
    slots: Box<[SyncUnsafeCell<Option<T>>]>,
    remaining: AtomicUsize,
    done: AtomicBool,
    promise: Promise<Vec<T>>,
}

/// Waits for every source, short-circuiting on the first error.
///
/// On success the values appear in source order. The first error settles
/// the aggregate immediately; late values are discarded. An empty source
/// list yields an immediately settled empty vector.
pub fn all_of<T>(sources: &[Future<T>]) -> Future<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if sources.is_empty() {
        return done(Vec::new());
    }
    let promise = Promise::new();
    let result = promise.future();
    let gather = Arc::new(Gather {
        slots: (0..sources.len())
            .map(|_| SyncUnsafeCell::new(None))
            .collect(),
        remaining: AtomicUsize::new(sources.len()),
        done: AtomicBool::new(false),
        promise,
    });
    for (index, source) in sources.iter().enumerate() {
        let gather = Arc::clone(&gather);
        source.subscribe(move |outcome| match outcome {
            Err(err) => {
                if gather
                    .done
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    gather.promise.set(Err(err.clone()));
                }
            }
            Ok(val) => {
                // SAFETY: this continuation is the only writer of its slot.
                gather.slots[index].with_mut(|p| unsafe { *p = Some(val.clone()) });
                if gather.remaining.fetch_sub(1, Ordering::AcqRel) == 1
                    && gather
                        .done
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    let values = gather
                        .slots
                        .iter()
                        // SAFETY: the final decrement ordered every slot
                        // write before this read; no writers remain.
                        .map(|slot| slot.with_mut(|p| unsafe { (*p).take().expect("all_of: [1]") }))
                        .collect();
                    gather.promise.set(Ok(values));
                }
            }
        });
    }
    result
}

/// Bounds how long `source` may take to settle.
///
/// Settles with [`Error::Timeout`] if `duration` elapses first; otherwise
/// forwards the source outcome and stops the timer. A single-shot flag
/// resolves the race between the two.
pub fn timeout<T>(source: &Future<T>, duration: Duration) -> Future<T>
where
    T: Clone + Send + Sync + 'static,
{
    let promise = Promise::new();
    let result = promise.future();
    let done = Arc::new(AtomicBool::new(false));

    let timer_done = Arc::clone(&done);
    let timer_promise = promise.clone();
    let guard = timer::global().schedule(
        duration,
        Box::new(move || {
            if timer_done
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                timer_promise.set(Err(Error::Timeout));
            }
        }),
    );

    source.subscribe(move |outcome| {
        if done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            promise.set(outcome.clone());
            guard.stop();
        }
    });
    result
}

/// Races `source` against a cancellation token.
///
/// The derived future settles with the source outcome or
/// [`Error::Cancelled`], whichever signal fires first. The source itself is
/// not interrupted.
pub fn with_cancel<T>(source: &Future<T>, token: &CancelToken) -> Future<T>
where
    T: Clone + Send + Sync + 'static,
{
    let promise = Promise::new();
    let result = promise.future();
    let done = Arc::new(AtomicBool::new(false));

    let cancel_done = Arc::clone(&done);
    let cancel_promise = promise.clone();
    token.subscribe(move || {
        if cancel_done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            cancel_promise.set(Err(Error::Cancelled));
        }
    });

    source.subscribe(move |outcome| {
        if done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            promise.set(outcome.clone());
        }
    });
    result
}
