//! Queue entries: callables packaged with the promise they settle.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use weft_future::{DynError, Promise, TaskError};

use crate::stop::StopToken;

/// One unit of work owned by the pool queue.
///
/// `Cancelable` tasks receive the worker's stop token as a final argument so
/// long-running work can observe `quit`.
pub(crate) enum Task {
    Plain(Box<dyn FnOnce() + Send>),
    Cancelable(Box<dyn FnOnce(StopToken) + Send>),
}

impl Task {
    pub(crate) fn run(self, token: &StopToken) {
        match self {
            Task::Plain(job) => job(),
            Task::Cancelable(job) => job(token.clone()),
        }
    }
}

/// Package a callable so that its outcome — value or panic — settles
/// `promise`.
pub(crate) fn package<R, F>(f: F, promise: Promise<R, DynError>) -> Box<dyn FnOnce() + Send>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    Box::new(move || match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => {
            let _ = promise.set_result(value);
        }
        Err(payload) => {
            let error: DynError = Arc::new(TaskError::from_panic(payload));
            let _ = promise.set_error(error);
        }
    })
}

/// As [`package`], for callables that take the worker's stop token.
pub(crate) fn package_cancelable<R, F>(
    f: F,
    promise: Promise<R, DynError>,
) -> Box<dyn FnOnce(StopToken) + Send>
where
    F: FnOnce(StopToken) -> R + Send + 'static,
    R: Send + 'static,
{
    Box::new(move |token| {
        match catch_unwind(AssertUnwindSafe(move || f(token))) {
            Ok(value) => {
                let _ = promise.set_result(value);
            }
            Err(payload) => {
                let error: DynError = Arc::new(TaskError::from_panic(payload));
                let _ = promise.set_error(error);
            }
        };
    })
}

/// Package a fallible callable; `Err` values and panics both land in the
/// future's error branch.
pub(crate) fn package_try<R, E, F>(f: F, promise: Promise<R, E>) -> Box<dyn FnOnce() + Send>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: From<TaskError> + Clone + Send + 'static,
{
    Box::new(move || match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            let _ = promise.set_result(value);
        }
        Ok(Err(error)) => {
            let _ = promise.set_error(error);
        }
        Err(payload) => {
            let _ = promise.set_error(E::from(TaskError::from_panic(payload)));
        }
    })
}
