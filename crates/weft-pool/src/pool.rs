//! The pool proper: core state, worker loop, public handle, global instance.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use weft_future::{make_promise, DynError, Executor, Future, Futures, TaskError};

use crate::error::PoolError;
use crate::stop::{StopSource, StopToken};
use crate::task::{self, Task};

struct QueueState {
    queue: VecDeque<Task>,
    stop: bool,
}

/// Shared pool state. Future states hold this behind a `Weak`, which is how
/// `async_then` finds its way back onto the pool without keeping it alive.
struct PoolCore {
    state: Mutex<QueueState>,
    /// Wakes parked workers when work arrives or the pool stops.
    worker_cv: Condvar,
    /// Wakes `wait`ers when the pool may have gone idle.
    idle_cv: Condvar,
    busy: AtomicUsize,
    stop_source: StopSource,
}

impl PoolCore {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                stop: false,
            }),
            worker_cv: Condvar::new(),
            idle_cv: Condvar::new(),
            busy: AtomicUsize::new(0),
            stop_source: StopSource::new(),
        }
    }

    fn submit(&self, task: Task) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            if state.stop {
                return Err(PoolError::Stopped);
            }
            state.queue.push_back(task);
        }
        self.worker_cv.notify_one();
        Ok(())
    }

    /// Enqueue a batch atomically, then wake one worker per task.
    fn submit_batch(&self, tasks: Vec<Task>) -> Result<(), PoolError> {
        let count = tasks.len();
        {
            let mut state = self.state.lock();
            if state.stop {
                return Err(PoolError::Stopped);
            }
            state.queue.extend(tasks);
        }
        for _ in 0..count {
            self.worker_cv.notify_one();
        }
        Ok(())
    }
}

impl Executor for PoolCore {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), TaskError> {
        self.submit(Task::Plain(job)).map_err(|_| TaskError::Stopped)
    }
}

fn worker_loop(id: usize, core: Arc<PoolCore>) {
    let token = core.stop_source.token();
    trace!(worker = id, "worker started");
    loop {
        let task = {
            let mut state = core.state.lock();
            while state.queue.is_empty() && !state.stop {
                core.worker_cv.wait(&mut state);
            }
            match state.queue.pop_front() {
                Some(task) => {
                    // Claim busy while the queue lock is held so `wait`
                    // never observes an in-flight task as idle.
                    core.busy.fetch_add(1, Ordering::SeqCst);
                    task
                }
                // Stopping and drained.
                None => break,
            }
        };

        // Packaged tasks settle their promise under their own catch_unwind;
        // this one covers raw `execute` jobs so a panic cannot take the
        // worker down with it.
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run(&token))).is_err() {
            warn!(worker = id, "task escaped with a panic");
        }

        if core.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Signal idleness under the queue lock; an unlocked notify can
            // slip between a waiter's predicate check and its sleep.
            let state = core.state.lock();
            if state.queue.is_empty() {
                core.idle_cv.notify_all();
            }
        }
    }
    trace!(worker = id, "worker stopped");
}

/// A fixed-size pool of OS worker threads over a FIFO task queue.
///
/// The pool is not cloneable; share it by reference or use the global
/// instance. Dropping the pool quits it (workers drain the queue and join).
pub struct ThreadPool {
    core: Arc<PoolCore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let core = Arc::new(PoolCore::new());
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let core = Arc::clone(&core);
            let handle = thread::Builder::new()
                .name(format!("weft-worker-{id}"))
                .spawn(move || worker_loop(id, core))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        debug!(threads, "thread pool started");
        Self {
            core,
            workers: Mutex::new(workers),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// This pool as an executor for continuation hops
    /// ([`Future::then_via`]).
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.core) as Arc<dyn Executor>
    }

    fn executor_weak(&self) -> Weak<dyn Executor> {
        Arc::downgrade(&self.executor())
    }

    /// Run `f` on a worker; the returned future settles with its result, or
    /// with a [`TaskError::Panicked`] if it panics.
    pub fn run<R, F>(&self, f: F) -> Result<Future<R, DynError>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let promise = make_promise::<R, DynError>();
        promise.bind_executor(self.executor_weak());
        let future = promise.future();
        self.core.submit(Task::Plain(task::package(f, promise)))?;
        Ok(future)
    }

    /// Run a long-lived callable that polls the worker's [`StopToken`].
    ///
    /// `quit` trips every worker token, so cooperative tasks can exit; a
    /// task that returns without settling its promise leaves waiters
    /// blocked — no cancellation error is synthesized.
    pub fn run_cancelable<R, F>(&self, f: F) -> Result<Future<R, DynError>, PoolError>
    where
        F: FnOnce(StopToken) -> R + Send + 'static,
        R: Send + 'static,
    {
        let promise = make_promise::<R, DynError>();
        promise.bind_executor(self.executor_weak());
        let future = promise.future();
        self.core
            .submit(Task::Cancelable(task::package_cancelable(f, promise)))?;
        Ok(future)
    }

    /// Run a fallible callable; `Err` and panics both fail the future.
    pub fn run_try<R, E, F>(&self, f: F) -> Result<Future<R, E>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<TaskError> + Clone + Send + 'static,
    {
        let promise = make_promise::<R, E>();
        promise.bind_executor(self.executor_weak());
        let future = promise.future();
        self.core.submit(Task::Plain(task::package_try(f, promise)))?;
        Ok(future)
    }

    /// Enqueue `f(key)` for every key, collecting the per-key futures into
    /// an aggregate keyed by the input values.
    ///
    /// Tasks are enqueued in key order as one batch, and one worker is
    /// woken per element.
    pub fn map<K, R, F, I>(&self, keys: I, f: F) -> Result<Futures<R, K, DynError>, PoolError>
    where
        I: IntoIterator<Item = K>,
        K: Clone + PartialEq + Send + 'static,
        R: Clone + Send + 'static,
        F: Fn(K) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut pairs = Vec::new();
        let mut tasks = Vec::new();
        for key in keys {
            let promise = make_promise::<R, DynError>();
            promise.bind_executor(self.executor_weak());
            pairs.push((key.clone(), promise.future()));
            let f = Arc::clone(&f);
            tasks.push(Task::Plain(task::package(move || f(key), promise)));
        }
        let futures = Futures::from_futures(pairs);
        futures.bind_executor(self.executor_weak());
        self.core.submit_batch(tasks)?;
        Ok(futures)
    }

    /// Fallible [`map`](Self::map): per-key `Err`s settle the matching
    /// sub-future, and the aggregate fails with the first error in key
    /// order.
    pub fn map_try<K, R, E, F, I>(&self, keys: I, f: F) -> Result<Futures<R, K, E>, PoolError>
    where
        I: IntoIterator<Item = K>,
        K: Clone + PartialEq + Send + 'static,
        R: Clone + Send + 'static,
        E: From<TaskError> + Clone + Send + 'static,
        F: Fn(K) -> Result<R, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut pairs = Vec::new();
        let mut tasks = Vec::new();
        for key in keys {
            let promise = make_promise::<R, E>();
            promise.bind_executor(self.executor_weak());
            pairs.push((key.clone(), promise.future()));
            let f = Arc::clone(&f);
            tasks.push(Task::Plain(task::package_try(move || f(key), promise)));
        }
        let futures = Futures::from_futures(pairs);
        futures.bind_executor(self.executor_weak());
        self.core.submit_batch(tasks)?;
        Ok(futures)
    }

    /// Fire-and-forget submission without a future.
    pub fn execute<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.submit(Task::Plain(Box::new(f)))
    }

    /// Block until the queue is empty and no worker is running a task.
    pub fn wait(&self) {
        let mut state = self.core.state.lock();
        while !(state.queue.is_empty() && self.core.busy.load(Ordering::SeqCst) == 0) {
            self.core.idle_cv.wait(&mut state);
        }
    }

    /// As [`wait`](Self::wait), giving up after `timeout`. Returns whether
    /// the pool was observed idle.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.core.state.lock();
        loop {
            if state.queue.is_empty() && self.core.busy.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            // Re-check the predicate on every wakeup, spurious or not.
            let _ = self.core.idle_cv.wait_for(&mut state, remaining);
        }
    }

    /// Stop the pool: no further submissions are accepted, workers drain
    /// the queue, trip every stop token, and join. Idempotent.
    pub fn quit(&self) {
        {
            let mut state = self.core.state.lock();
            if state.stop {
                return;
            }
            state.stop = true;
        }
        debug!("thread pool quitting");
        self.core.stop_source.request_stop();
        self.core.worker_cv.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }

    /// Configure the thread count of the global pool.
    ///
    /// Must happen before the first [`global`](Self::global) call; fails
    /// with [`PoolError::GlobalAlreadyInitialized`] afterwards.
    pub fn set_global_threads(threads: usize) -> Result<(), PoolError> {
        if GLOBAL_POOL.get().is_some() {
            return Err(PoolError::GlobalAlreadyInitialized);
        }
        GLOBAL_THREADS.store(threads.max(1), Ordering::SeqCst);
        Ok(())
    }

    /// The lazily constructed process-wide pool.
    pub fn global() -> &'static ThreadPool {
        GLOBAL_POOL.get_or_init(|| match GLOBAL_THREADS.load(Ordering::SeqCst) {
            0 => ThreadPool::default(),
            threads => ThreadPool::new(threads),
        })
    }
}

impl Default for ThreadPool {
    /// A pool with one worker per available hardware thread.
    fn default() -> Self {
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(threads)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.quit();
    }
}

static GLOBAL_POOL: OnceLock<ThreadPool> = OnceLock::new();
/// Thread count requested for the global pool; 0 means "hardware default".
static GLOBAL_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Pool-scheduled continuations for futures produced anywhere.
pub trait FuturePoolExt<T, E> {
    /// Chain `f` so it runs on a worker of `pool` once `self` is ready.
    fn then_on<U, F>(&self, pool: &ThreadPool, f: F) -> Future<U, E>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static;
}

impl<T, E> FuturePoolExt<T, E> for Future<T, E>
where
    T: Clone + Send + 'static,
    E: From<TaskError> + Clone + Send + 'static,
{
    fn then_on<U, F>(&self, pool: &ThreadPool, f: F) -> Future<U, E>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.then_via(&pool.executor(), f)
    }
}

impl<T, K, E> FuturePoolExt<Vec<T>, E> for Futures<T, K, E>
where
    T: Clone + Send + 'static,
    K: PartialEq + Send + 'static,
    E: From<TaskError> + Clone + Send + 'static,
{
    fn then_on<U, F>(&self, pool: &ThreadPool, f: F) -> Future<U, E>
    where
        F: FnMut(Vec<T>) -> U + Send + 'static,
        U: Send + 'static,
    {
        self.aggregate().then_via(&pool.executor(), f)
    }
}

/// [`ThreadPool::run`] on the global pool.
pub fn run<R, F>(f: F) -> Result<Future<R, DynError>, PoolError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    ThreadPool::global().run(f)
}

/// [`ThreadPool::run_cancelable`] on the global pool.
pub fn run_cancelable<R, F>(f: F) -> Result<Future<R, DynError>, PoolError>
where
    F: FnOnce(StopToken) -> R + Send + 'static,
    R: Send + 'static,
{
    ThreadPool::global().run_cancelable(f)
}

/// [`ThreadPool::run_try`] on the global pool.
pub fn run_try<R, E, F>(f: F) -> Result<Future<R, E>, PoolError>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: From<TaskError> + Clone + Send + 'static,
{
    ThreadPool::global().run_try(f)
}

/// [`ThreadPool::map`] on the global pool.
pub fn map<K, R, F, I>(keys: I, f: F) -> Result<Futures<R, K, DynError>, PoolError>
where
    I: IntoIterator<Item = K>,
    K: Clone + PartialEq + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(K) -> R + Send + Sync + 'static,
{
    ThreadPool::global().map(keys, f)
}

/// [`ThreadPool::map_try`] on the global pool.
pub fn map_try<K, R, E, F, I>(keys: I, f: F) -> Result<Futures<R, K, E>, PoolError>
where
    I: IntoIterator<Item = K>,
    K: Clone + PartialEq + Send + 'static,
    R: Clone + Send + 'static,
    E: From<TaskError> + Clone + Send + 'static,
    F: Fn(K) -> Result<R, E> + Send + Sync + 'static,
{
    ThreadPool::global().map_try(keys, f)
}

/// [`ThreadPool::wait`] on the global pool.
pub fn wait() {
    ThreadPool::global().wait();
}

/// [`ThreadPool::wait_for`] on the global pool.
pub fn wait_for(timeout: Duration) -> bool {
    ThreadPool::global().wait_for(timeout)
}

/// [`ThreadPool::quit`] on the global pool.
pub fn quit() {
    ThreadPool::global().quit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_execute_and_settle_futures() {
        let pool = ThreadPool::new(2);
        let future = pool.run(|| 21 * 2).unwrap();
        assert_eq!(future.wait().unwrap(), 42);
        pool.quit();
    }

    #[test]
    fn quit_rejects_further_submissions() {
        let pool = ThreadPool::new(1);
        pool.quit();
        assert!(matches!(pool.run(|| 0), Err(PoolError::Stopped)));
        assert!(matches!(pool.execute(|| ()), Err(PoolError::Stopped)));
        assert!(matches!(pool.map(0..3, |k| k), Err(PoolError::Stopped)));
    }

    #[test]
    fn double_quit_is_a_no_op() {
        let pool = ThreadPool::new(1);
        pool.quit();
        pool.quit();
    }

    #[test]
    fn queued_tasks_drain_on_quit() {
        let pool = ThreadPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                std::thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.quit();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn worker_survives_a_panicking_job() {
        let pool = ThreadPool::new(1);
        let _ = pool.execute(|| panic!("deliberate"));
        let future = pool.run(|| 5).unwrap();
        assert_eq!(future.wait().unwrap(), 5);
        pool.quit();
    }
}
