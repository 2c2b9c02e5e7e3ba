use crate::cell::State;
use crate::error::{Error, Outcome};
use crate::token::CancelToken;
use std::fmt;
use std::sync::Arc;

/// Producer handle of a single-assignment cell.
///
/// A promise stores a value or an error that consumers acquire through the
/// [`Future`]s it hands out. It is meant to be set exactly once; the
/// settling store synchronizes-with every observation of the settled state
/// (blocking gets, polls and subscriptions).
///
/// Clones share the same cell.
pub struct Promise<T> {
    state: Arc<State<T>>,
}

/// Consumer handle of a single-assignment cell.
///
/// Futures observe the outcome of an asynchronous operation: blocking
/// [`get`](Future::get), non-blocking [`is_done`](Future::is_done), or a
/// one-shot [`subscribe`](Future::subscribe) continuation.
///
/// Clones share the same cell.
pub struct Future<T> {
    state: Arc<State<T>>,
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Creates a promise with an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::new()),
        }
    }

    /// Settles the cell.
    ///
    /// # Panics
    /// If the cell is already settled. Racing writers must use
    /// [`set_safely`](Promise::set_safely).
    pub fn set(&self, outcome: Outcome<T>) {
        assert!(self.state.set(outcome), "{}", Error::NotSet);
    }

    /// Settles the cell, reporting a conflict instead of panicking.
    ///
    /// Exactly one of any number of concurrent callers returns `true`.
    pub fn set_safely(&self, outcome: Outcome<T>) -> bool {
        self.state.set(outcome)
    }

    /// A future observing this promise's cell.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future {
            state: Arc::clone(&self.state),
        }
    }

    /// Whether the cell is still unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl<T: Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.state.is_settled())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    /// Blocks until the cell settles and returns the outcome.
    pub fn get(&self) -> Outcome<T>
    where
        T: Clone,
    {
        self.state.wait(None)
    }

    /// Blocks until the cell settles or `token` fires, whichever is first.
    ///
    /// Returns [`Error::Cancelled`] when the token wins the race.
    pub fn get_with(&self, token: &CancelToken) -> Outcome<T>
    where
        T: Clone,
    {
        self.state.wait(Some(token))
    }

    /// Registers a continuation fired exactly once when the cell settles.
    ///
    /// The callback runs on whichever thread settled the cell (or inline
    /// when the cell is already settled), so it must not block.
    pub fn subscribe(&self, f: impl FnOnce(&Outcome<T>) + Send + 'static) {
        self.state.subscribe(Box::new(f));
    }

    /// Whether the cell has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.is_settled()
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("settled", &self.state.is_settled())
            .finish()
    }
}
