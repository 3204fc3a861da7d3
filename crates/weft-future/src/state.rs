//! The shared state behind a promise/future pair.

use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::error::StateError;
use crate::executor::Executor;

pub(crate) type SuccessFn<T> = Box<dyn FnMut(&T) + Send>;
/// Error continuations return `true` when they handled the error, which
/// stops the remaining handlers from running.
pub(crate) type ErrorFn<E> = Box<dyn FnMut(&E) -> bool + Send>;

struct Inner<T, E> {
    slot: Option<Result<T, E>>,
    ready: bool,
    on_success: Vec<SuccessFn<T>>,
    on_error: Vec<ErrorFn<E>>,
    executor: Option<Weak<dyn Executor>>,
}

/// One result slot shared by a producer handle, any number of consumer
/// handles, and every continuation that captured it.
pub(crate) struct State<T, E> {
    inner: Mutex<Inner<T, E>>,
    ready_cv: Condvar,
}

impl<T, E> State<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: None,
                ready: false,
                on_success: Vec::new(),
                on_error: Vec::new(),
                executor: None,
            }),
            ready_cv: Condvar::new(),
        }
    }

    /// Store a value and flip to ready.
    ///
    /// Success continuations run in registration order while the lock is
    /// still held; this serializes them against late registrations, `take`,
    /// and concurrent waiters.
    pub(crate) fn fulfill(&self, value: T) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        if inner.ready {
            return Err(StateError::AlreadyFulfilled);
        }
        inner.slot = Some(Ok(value));
        inner.ready = true;
        let mut callbacks = std::mem::take(&mut inner.on_success);
        if let Some(Ok(value)) = inner.slot.as_ref() {
            for callback in callbacks.iter_mut() {
                callback(value);
            }
        }
        inner.on_success = callbacks;
        self.ready_cv.notify_all();
        Ok(())
    }

    /// Store an error and flip to ready.
    ///
    /// Error continuations run in registration order; iteration stops at the
    /// first handler that reports the error as handled.
    pub(crate) fn fail(&self, error: E) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        if inner.ready {
            return Err(StateError::AlreadyFulfilled);
        }
        inner.slot = Some(Err(error));
        inner.ready = true;
        let mut callbacks = std::mem::take(&mut inner.on_error);
        if let Some(Err(error)) = inner.slot.as_ref() {
            for callback in callbacks.iter_mut() {
                if callback(error) {
                    break;
                }
            }
        }
        inner.on_error = callbacks;
        self.ready_cv.notify_all();
        Ok(())
    }

    /// Register a success continuation.
    ///
    /// If the state is already ready with a value, the continuation runs
    /// synchronously in the registering thread before it is stored.
    pub(crate) fn push_success(&self, mut callback: SuccessFn<T>) {
        let mut inner = self.inner.lock();
        if inner.ready {
            if let Some(Ok(value)) = inner.slot.as_ref() {
                callback(value);
            }
        }
        inner.on_success.push(callback);
    }

    /// Register an error continuation; same late-registration rule as
    /// [`push_success`](Self::push_success).
    pub(crate) fn push_error(&self, mut callback: ErrorFn<E>) {
        let mut inner = self.inner.lock();
        if inner.ready {
            if let Some(Err(error)) = inner.slot.as_ref() {
                callback(error);
            }
        }
        inner.on_error.push(callback);
    }

    /// Block until ready, then clone the stored outcome out.
    pub(crate) fn wait_cloned(&self) -> Result<T, E>
    where
        T: Clone,
        E: Clone,
    {
        let mut inner = self.inner.lock();
        while !inner.ready {
            self.ready_cv.wait(&mut inner);
        }
        match inner.slot.as_ref().expect("ready state holds a result") {
            Ok(value) => Ok(value.clone()),
            Err(error) => Err(error.clone()),
        }
    }

    /// Block until ready, then move the outcome out and clear readiness so
    /// the producer may fulfill the slot again.
    pub(crate) fn take(&self) -> Result<T, E> {
        let mut inner = self.inner.lock();
        while !inner.ready {
            self.ready_cv.wait(&mut inner);
        }
        inner.ready = false;
        inner.slot.take().expect("ready state holds a result")
    }

    pub(crate) fn bind_executor(&self, executor: Weak<dyn Executor>) {
        self.inner.lock().executor = Some(executor);
    }

    /// The attached executor, if it is still alive.
    pub(crate) fn executor(&self) -> Option<Arc<dyn Executor>> {
        self.inner.lock().executor.as_ref().and_then(Weak::upgrade)
    }
}

/// Copy one state's executor binding into a downstream state, so chained
/// futures inherit the pool of their ancestor.
pub(crate) fn inherit_executor<T1, E1, T2, E2>(from: &State<T1, E1>, into: &State<T2, E2>) {
    let executor = from.inner.lock().executor.clone();
    if let Some(executor) = executor {
        into.inner.lock().executor = Some(executor);
    }
}
