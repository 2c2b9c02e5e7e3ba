use crate::error::{Error, Outcome};
use crate::sync::{AtomicBool, AtomicPtr, AtomicU32, Ordering, Parker};
use crate::token::CancelToken;
use crate::types::SyncUnsafeCell;
use std::ptr;
use std::sync::Arc;

const EMPTY: u32 = 0;
const SETTLING: u32 = 1;
const SETTLED: u32 = 2;

type BoxedCallback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

/// Lock-free single-assignment cell shared by a promise/future pair.
///
/// Holds an atomic status word (`EMPTY -> SETTLING -> SETTLED`), the settled
/// outcome, and a CAS-maintained LIFO stack of one-shot continuations.
/// Blocked getters are continuations that unpark their own thread, so the
/// drain pass doubles as the broadcast wake-up.
pub(crate) struct State<T> {
    status: AtomicU32,
    outcome: SyncUnsafeCell<Option<Outcome<T>>>,
    stack: AtomicPtr<Callback<T>>,
}

struct Callback<T> {
    /// Single-fire latch resolving the drain-vs-late-subscribe race.
    fired: AtomicBool,
    f: SyncUnsafeCell<Option<BoxedCallback<T>>>,
    next: AtomicPtr<Callback<T>>,
}

impl<T> Callback<T> {
    fn fire(&self, outcome: &Outcome<T>) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // SAFETY: the latch grants exclusive access to the slot.
            let f = self.f.with_mut(|p| unsafe { (*p).take() });
            if let Some(f) = f {
                f(outcome);
            }
        }
    }
}

impl<T> State<T> {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU32::new(EMPTY),
            outcome: SyncUnsafeCell::new(None),
            stack: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.status.load(Ordering::Acquire) == EMPTY
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.status.load(Ordering::Acquire) == SETTLED
    }

    /// Reads the settled outcome.
    ///
    /// Callers must have observed `SETTLED` (or be the settling writer).
    fn with_outcome<R>(&self, f: impl FnOnce(&Outcome<T>) -> R) -> R {
        self.outcome.with(|p| {
            // SAFETY: the outcome is written before the `SETTLED` store and
            // never mutated afterwards; the status load ordered the read.
            let outcome = unsafe { (*p).as_ref().expect("State::with_outcome: [1]") };
            f(outcome)
        })
    }

    /// Attempts to settle the cell.
    ///
    /// Exactly one caller wins the `EMPTY -> SETTLING` transition; losers get
    /// `false` and their outcome is dropped. The winner stores the outcome,
    /// publishes `SETTLED`, and drains the continuation stack, firing every
    /// record present at that moment exactly once.
    pub(crate) fn set(&self, outcome: Outcome<T>) -> bool {
        if self
            .status
            .compare_exchange(EMPTY, SETTLING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        // Sole writer: no reader can observe the slot until SETTLED.
        self.outcome.with_mut(|p| unsafe { *p = Some(outcome) });
        self.status.store(SETTLED, Ordering::Release);

        loop {
            let head = self.stack.load(Ordering::Acquire);
            if head.is_null() {
                break;
            }
            // SAFETY: `head` came from `Arc::into_raw` and its record is kept
            // alive by the reference the stack holds.
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            if self
                .stack
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: a successful pop transfers the stack's reference.
                let record = unsafe { Arc::from_raw(head) };
                self.with_outcome(|out| record.fire(out));
            }
        }
        true
    }

    pub(crate) fn try_get(&self) -> Option<Outcome<T>>
    where
        T: Clone,
    {
        if self.is_settled() {
            Some(self.with_outcome(Clone::clone))
        } else {
            None
        }
    }

    /// Registers a one-shot continuation.
    ///
    /// Settled fast path invokes the callback inline on the calling thread.
    /// Otherwise the record is CAS-pushed and the status is re-checked: a
    /// settle that raced with the push is handled by firing the record from
    /// here, which the single-fire latch makes safe against the drain pass.
    pub(crate) fn subscribe(&self, f: BoxedCallback<T>) {
        if self.is_settled() {
            self.with_outcome(|out| f(out));
            return;
        }
        let record = Arc::new(Callback {
            fired: AtomicBool::new(false),
            f: SyncUnsafeCell::new(Some(f)),
            next: AtomicPtr::new(ptr::null_mut()),
        });
        let raw = Arc::into_raw(Arc::clone(&record)) as *mut Callback<T>;
        loop {
            let head = self.stack.load(Ordering::Acquire);
            if self.is_settled() {
                // The record was never published; reclaim the reference
                // reserved for the stack and fire directly.
                // SAFETY: `raw` was produced by `Arc::into_raw` above.
                unsafe { drop(Arc::from_raw(raw)) };
                self.with_outcome(|out| record.fire(out));
                return;
            }
            record.next.store(head, Ordering::Relaxed);
            if self
                .stack
                .compare_exchange(head, raw, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if self.is_settled() {
                    self.with_outcome(|out| record.fire(out));
                }
                return;
            }
        }
    }

    /// Blocks until the cell settles or the token fires, whichever is first.
    ///
    /// All concurrent waiters observe the same settled outcome. The settled
    /// check always wins over a concurrent cancellation.
    pub(crate) fn wait(&self, token: Option<&CancelToken>) -> Outcome<T>
    where
        T: Clone,
    {
        if let Some(out) = self.try_get() {
            return out;
        }
        let parker = Parker::new();
        let unparker = parker.unparker();
        self.subscribe(Box::new(move |_| unparker.unpark()));
        if let Some(token) = token {
            let unparker = parker.unparker();
            token.subscribe(move || unparker.unpark());
        }
        loop {
            if let Some(out) = self.try_get() {
                return out;
            }
            if let Some(token) = token {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }
            parker.park();
        }
    }
}

impl<T> Drop for State<T> {
    fn drop(&mut self) {
        // Reclaim records the drain pass never popped: continuations pushed
        // after settling, and all of them when the cell never settled.
        let mut head = self.stack.load(Ordering::Acquire);
        while !head.is_null() {
            // SAFETY: every stack entry holds one reference from
            // `Arc::into_raw`; exclusive access here ends the list's life.
            let record = unsafe { Arc::from_raw(head) };
            head = record.next.load(Ordering::Relaxed);
        }
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

    #[test]
    fn settles_once_and_rejects_conflicts() {
        let state = State::new();
        assert!(state.is_empty());
        assert!(state.set(Ok(1)));
        assert!(!state.set(Ok(2)));
        assert!(state.is_settled());
        assert_eq!(state.try_get().unwrap().unwrap(), 1);
    }

    #[test]
    fn early_and_late_subscribers_fire_exactly_once() {
        let state = State::new();
        let fires = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fires);
        state.subscribe(Box::new(move |out: &Outcome<i32>| {
            assert_eq!(*out.as_ref().unwrap(), 5);
            counter.fetch_add(1, StdOrdering::Relaxed);
        }));
        assert!(state.set(Ok(5)));

        let counter = Arc::clone(&fires);
        state.subscribe(Box::new(move |out: &Outcome<i32>| {
            assert_eq!(*out.as_ref().unwrap(), 5);
            counter.fetch_add(1, StdOrdering::Relaxed);
        }));

        assert_eq!(fires.load(StdOrdering::Relaxed), 2);
    }

    #[test]
    fn callback_observes_a_settled_cell() {
        let state = Arc::new(State::new());
        let observed = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&state);
        let flag = Arc::clone(&observed);
        state.subscribe(Box::new(move |_: &Outcome<i32>| {
            flag.store(usize::from(inner.is_settled()), StdOrdering::Relaxed);
        }));
        assert!(state.set(Ok(9)));
        assert_eq!(observed.load(StdOrdering::Relaxed), 1);
    }

    #[test]
    fn unsettled_cell_drops_pending_records() {
        let state = State::<i32>::new();
        state.subscribe(Box::new(|_| unreachable!("must not fire")));
        drop(state);
    }
}
