//! Promise and future handles over a shared result slot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{DynError, StateError, TaskError};
use crate::executor::Executor;
use crate::state::{inherit_executor, State};

/// Create a connected promise; hand out futures with [`Promise::future`].
pub fn make_promise<T, E>() -> Promise<T, E> {
    Promise {
        state: Arc::new(State::new()),
    }
}

/// The produce side of a shared result slot.
///
/// Promises are cheap to clone; every clone settles the same slot. Settling
/// an already-ready slot is a contract violation and returns
/// [`StateError::AlreadyFulfilled`].
pub struct Promise<T, E = DynError> {
    pub(crate) state: Arc<State<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Promise<T, E> {
    /// A consume-side handle sharing this promise's slot.
    pub fn future(&self) -> Future<T, E> {
        Future {
            state: Arc::clone(&self.state),
        }
    }

    /// Fulfill the slot with a value, running success continuations.
    pub fn set_result(&self, value: T) -> Result<(), StateError> {
        self.state.fulfill(value)
    }

    /// Fail the slot with an error, running error continuations.
    pub fn set_error(&self, error: E) -> Result<(), StateError> {
        self.state.fail(error)
    }

    /// Attach the executor that `async_then` on derived futures should use.
    ///
    /// The reference is weak: futures never keep a pool alive. Thread pools
    /// call this on every promise they hand out.
    pub fn bind_executor(&self, executor: Weak<dyn Executor>) {
        self.state.bind_executor(executor);
    }
}

impl<E> Promise<(), E> {
    /// Fulfill a value-less promise.
    pub fn set_ready(&self) -> Result<(), StateError> {
        self.set_result(())
    }
}

/// The consume side of a shared result slot.
///
/// Futures block on [`wait`](Self::wait)/[`take`](Self::take) or chain
/// callbacks with the `then` family. Clones observe the same slot.
pub struct Future<T, E = DynError> {
    pub(crate) state: Arc<State<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    /// Block until the future settles and clone the outcome out.
    ///
    /// May be called any number of times; the slot keeps its value.
    pub fn wait(&self) -> Result<T, E>
    where
        T: Clone,
    {
        self.state.wait_cloned()
    }

    /// Block until the future settles, move the outcome out, and clear
    /// readiness so the producer may fulfill the slot again.
    ///
    /// This is the move-only idiom: repeated `take` calls alternate with
    /// re-fulfillments.
    pub fn take(&self) -> Result<T, E> {
        self.state.take()
    }

    /// Chain a value transformation, producing a future of its result.
    ///
    /// Errors bypass `f` and flow to the returned future unchanged. If this
    /// future is already settled, `f` runs synchronously in this call.
    pub fn then<U, F>(&self, mut f: F) -> Future<U, E>
    where
        F: FnMut(&T) -> U + Send + 'static,
        U: Send + 'static,
    {
        let next = make_promise::<U, E>();
        inherit_executor(&self.state, &next.state);
        let on_value = next.clone();
        self.state.push_success(Box::new(move |value: &T| {
            let _ = on_value.set_result(f(value));
        }));
        let on_failure = next.clone();
        self.state.push_error(Box::new(move |error: &E| {
            let _ = on_failure.set_error(error.clone());
            true
        }));
        next.future()
    }

    /// Chain a continuation that itself returns a future, flattening it:
    /// the returned future settles with whatever the inner future settles
    /// with, and fails if either this future or the inner one fails.
    pub fn then_future<U, F>(&self, mut f: F) -> Future<U, E>
    where
        F: FnMut(&T) -> Future<U, E> + Send + 'static,
        U: Clone + Send + 'static,
    {
        let next = make_promise::<U, E>();
        inherit_executor(&self.state, &next.state);
        let on_value = next.clone();
        self.state.push_success(Box::new(move |value: &T| {
            let inner = f(value);
            let fulfill = on_value.clone();
            inner.state.push_success(Box::new(move |inner_value: &U| {
                let _ = fulfill.set_result(inner_value.clone());
            }));
            let fail = on_value.clone();
            inner.state.push_error(Box::new(move |error: &E| {
                let _ = fail.set_error(error.clone());
                true
            }));
        }));
        let on_failure = next.clone();
        self.state.push_error(Box::new(move |error: &E| {
            let _ = on_failure.set_error(error.clone());
            true
        }));
        next.future()
    }

    /// Chain a fallible transformation: `Ok` fulfills the returned future,
    /// `Err` fails it.
    pub fn then_try<U, F>(&self, mut f: F) -> Future<U, E>
    where
        F: FnMut(&T) -> Result<U, E> + Send + 'static,
        U: Send + 'static,
    {
        let next = make_promise::<U, E>();
        inherit_executor(&self.state, &next.state);
        let on_value = next.clone();
        self.state.push_success(Box::new(move |value: &T| {
            match f(value) {
                Ok(mapped) => {
                    let _ = on_value.set_result(mapped);
                }
                Err(error) => {
                    let _ = on_value.set_error(error);
                }
            };
        }));
        let on_failure = next.clone();
        self.state.push_error(Box::new(move |error: &E| {
            let _ = on_failure.set_error(error.clone());
            true
        }));
        next.future()
    }

    /// Chain a transformation that runs on `executor` instead of the thread
    /// that settles this future.
    ///
    /// The job is enqueued only once this future is ready, so `f` starts
    /// strictly after the upstream value exists. A panicking `f`, or an
    /// executor that is gone or stopped, fails the returned future through
    /// `E`'s [`TaskError`] conversion.
    pub fn then_via<U, F>(&self, executor: &Arc<dyn Executor>, f: F) -> Future<U, E>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
        T: Clone,
        E: From<TaskError>,
    {
        let next = make_promise::<U, E>();
        next.bind_executor(Arc::downgrade(executor));
        let executor = Arc::downgrade(executor);
        let f = Arc::new(Mutex::new(f));
        let on_value = next.clone();
        self.state.push_success(Box::new(move |value: &T| {
            let value = value.clone();
            let f = Arc::clone(&f);
            let settle = on_value.clone();
            let job: Box<dyn FnOnce() + Send> = Box::new(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| (&mut *f.lock())(value)));
                match outcome {
                    Ok(mapped) => {
                        let _ = settle.set_result(mapped);
                    }
                    Err(payload) => {
                        let _ = settle.set_error(E::from(TaskError::from_panic(payload)));
                    }
                }
            });
            match executor.upgrade() {
                Some(executor) => {
                    if let Err(error) = executor.execute(job) {
                        let _ = on_value.set_error(E::from(error));
                    }
                }
                None => {
                    let _ = on_value.set_error(E::from(TaskError::Stopped));
                }
            }
        }));
        let on_failure = next.clone();
        self.state.push_error(Box::new(move |error: &E| {
            let _ = on_failure.set_error(error.clone());
            true
        }));
        next.future()
    }

    /// [`then_via`](Self::then_via) against the executor this future's
    /// state carries (installed by the pool that produced it).
    ///
    /// Fails with [`StateError::NoExecutor`] when no executor was ever
    /// attached or the pool is gone.
    pub fn async_then<U, F>(&self, f: F) -> Result<Future<U, E>, StateError>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Send + 'static,
        T: Clone,
        E: From<TaskError>,
    {
        let executor = self.state.executor().ok_or(StateError::NoExecutor)?;
        Ok(self.then_via(&executor, f))
    }

    /// Observe errors on this future. The handler always counts as having
    /// handled the error, so later error handlers do not run; it does not
    /// rescue the future or downstream chains.
    pub fn on_error<F>(&self, mut f: F) -> &Self
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.state.push_error(Box::new(move |error: &E| {
            f(error);
            true
        }));
        self
    }
}

impl<T> Future<T, DynError>
where
    T: Send + 'static,
{
    /// Observe errors of a concrete type on a dynamically typed error
    /// channel.
    ///
    /// The handler runs (and stops further handlers) only when the stored
    /// error downcasts to `X`; otherwise the next handler is tried.
    pub fn on_error_of<X, F>(&self, mut f: F) -> &Self
    where
        X: std::error::Error + Send + Sync + 'static,
        F: FnMut(&X) + Send + 'static,
    {
        self.state
            .push_error(Box::new(move |error: &DynError| match error.downcast_ref::<X>() {
                Some(concrete) => {
                    f(concrete);
                    true
                }
                None => false,
            }));
        self
    }
}
