use std::sync::{Arc, LazyLock, RwLock};
use std::thread;

/// A unit of work accepted by an [`Executor`].
pub type Work = Box<dyn FnOnce() + Send>;

/// Dispatches units of work for eventual execution.
///
/// `submit` returns without waiting for the work to run and must accept
/// work submitted from inside a running work unit: completing nodes submit
/// their newly ready children recursively. Submission failures are fatal
/// (a panic), never silent.
///
/// Implementations must not run the work inline before returning.
pub trait Executor: Send + Sync {
    /// Schedules `work` to run on some thread, now or later.
    fn submit(&self, work: Work);
}

/// Default executor: one fresh thread per submitted work unit.
///
/// Unbounded concurrency, no queueing, trivially reentrant.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn submit(&self, work: Work) {
        thread::Builder::new()
            .name("dagflow-task".into())
            .spawn(work)
            .expect("ThreadExecutor: failed to spawn task thread");
    }
}

/// Bounded executor: a fixed set of workers draining an unbounded queue.
///
/// Bounds concurrent work, not queue depth, so `submit` never blocks and
/// recursive submission cannot deadlock the submitter. Work units that
/// block on futures settled by *queued* (not yet running) work can still
/// starve a narrow pool; size the pool to the expected graph width when
/// running DAG instances on it.
#[derive(Debug)]
pub struct PoolExecutor {
    queue: crossbeam_channel::Sender<Work>,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl PoolExecutor {
    /// Spawns `workers` worker threads.
    ///
    /// # Panics
    /// If `workers` is zero or a worker thread cannot be spawned.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "PoolExecutor: worker count must be non-zero");
        let (queue, feed) = crossbeam_channel::unbounded::<Work>();
        let _workers = (0..workers)
            .map(|index| {
                let feed = feed.clone();
                thread::Builder::new()
                    .name(format!("dagflow-pool-{index}"))
                    .spawn(move || {
                        for work in feed.iter() {
                            work();
                        }
                        tracing::trace!(worker = index, "pool worker exiting");
                    })
                    .expect("PoolExecutor: failed to spawn worker thread")
            })
            .collect();
        Self { queue, _workers }
    }
}

impl Executor for PoolExecutor {
    fn submit(&self, work: Work) {
        // Workers only exit once the sender side is gone, so a send can
        // only fail after the pool itself was torn down.
        self.queue
            .send(work)
            .expect("PoolExecutor: worker queue disconnected");
    }
}

/// Executor backed by the global rayon thread pool.
///
/// `rayon::spawn` admits work from inside running tasks and only bounds
/// running work, which satisfies the recursive-submit requirement.
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn submit(&self, work: Work) {
        rayon::spawn(work);
    }
}

static GLOBAL: LazyLock<RwLock<Arc<dyn Executor>>> =
    LazyLock::new(|| RwLock::new(Arc::new(ThreadExecutor) as Arc<dyn Executor>));

/// The process-wide default executor.
///
/// Backs [`spawn`](crate::spawn) and DAG instances created without an
/// explicit executor. Starts out as [`ThreadExecutor`].
#[must_use]
pub fn global() -> Arc<dyn Executor> {
    GLOBAL
        .read()
        .expect("executor::global: lock poisoned")
        .clone()
}

/// Replaces the process-wide default executor.
///
/// Affects work submitted after the call; in-flight work is untouched.
pub fn set_global(executor: Arc<dyn Executor>) {
    *GLOBAL
        .write()
        .expect("executor::set_global: lock poisoned") = executor;
}
