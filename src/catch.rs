use crate::error::{Error, Outcome};
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Runs a fallible computation, converting abnormal termination into
/// [`Error::Panic`].
///
/// A caught panic carries its stringified payload and a backtrace captured
/// at the recovery site. Regular errors pass through unchanged, so callers
/// can set a promise with the returned outcome on every exit path.
pub fn catch<T>(f: impl FnOnce() -> Outcome<T>) -> Outcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::Panic {
            message: Arc::from(panic_message(payload.as_ref())),
            backtrace: Arc::from(Backtrace::force_capture().to_string().as_str()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}
