#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::cell::UnsafeCell;
    pub(crate) use loom::sync::atomic::{
        AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering,
    };

    use loom::sync::{Condvar, Mutex};
    use std::sync::Arc;

    /// One-shot permit parker modelled with loom primitives.
    ///
    /// Mirrors the permit semantics of `std::thread::park`: an `unpark`
    /// delivered before `park` makes the next `park` return immediately.
    pub(crate) struct Parker {
        inner: Arc<(Mutex<bool>, Condvar)>,
    }

    #[derive(Clone)]
    pub(crate) struct Unparker {
        inner: Arc<(Mutex<bool>, Condvar)>,
    }

    impl Parker {
        pub(crate) fn new() -> Self {
            Self {
                inner: Arc::new((Mutex::new(false), Condvar::new())),
            }
        }

        pub(crate) fn unparker(&self) -> Unparker {
            Unparker {
                inner: self.inner.clone(),
            }
        }

        pub(crate) fn park(&self) {
            let (lock, cv) = &*self.inner;
            let mut permit = lock.lock().unwrap();
            while !*permit {
                permit = cv.wait(permit).unwrap();
            }
            *permit = false;
        }
    }

    impl Unparker {
        pub(crate) fn unpark(&self) {
            let (lock, cv) = &*self.inner;
            *lock.lock().unwrap() = true;
            cv.notify_all();
        }
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use core::sync::atomic::{
        AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering,
    };
    pub(crate) use std::cell::UnsafeCell;

    use std::thread;

    /// Parker over the calling thread's native park/unpark permit.
    ///
    /// Must be created on the thread that will call `park`.
    pub(crate) struct Parker {
        thread: thread::Thread,
    }

    #[derive(Clone)]
    pub(crate) struct Unparker {
        thread: thread::Thread,
    }

    impl Parker {
        pub(crate) fn new() -> Self {
            Self {
                thread: thread::current(),
            }
        }

        pub(crate) fn unparker(&self) -> Unparker {
            Unparker {
                thread: self.thread.clone(),
            }
        }

        pub(crate) fn park(&self) {
            thread::park();
        }
    }

    impl Unparker {
        pub(crate) fn unpark(&self) {
            self.thread.unpark();
        }
    }
}

pub(crate) use imp::*;
