//! Error types shared across the future surface.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// A cheaply cloneable, dynamically typed error.
///
/// This is the "exception pointer" flavor of the error channel: refcounted,
/// shareable between a future and all of its continuations, and
/// downcastable via [`Future::on_error_of`](crate::Future::on_error_of).
pub type DynError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Contract violations on a promise/future pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// The promise was settled while its state was already ready.
    #[error("promise is already fulfilled")]
    AlreadyFulfilled,
    /// `async_then` was called on a future with no live executor attached.
    #[error("future has no executor attached")]
    NoExecutor,
}

/// Failures produced while running a task on an executor.
///
/// Used both by thread pools (a panicking callable settles its future with
/// `Panicked`) and by executor-hopping continuations (`Stopped` when the
/// target no longer accepts work). Fallible pipelines that want to ride an
/// executor provide a `From<TaskError>` conversion for their error type;
/// [`DynError`] has one out of the box.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task's callable panicked; the payload is stringified.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The executor has stopped and no longer accepts work.
    #[error("executor is stopped")]
    Stopped,
}

impl From<TaskError> for DynError {
    fn from(error: TaskError) -> Self {
        Arc::new(error)
    }
}

impl TaskError {
    /// Build a `Panicked` error from a captured unwind payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Contract violations on an aggregate future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FuturesError {
    /// A future was added after every existing element had already settled.
    #[error("aggregate has already settled")]
    AlreadySettled,
    /// No element is registered under the requested key.
    #[error("no future registered under the requested key")]
    NoSuchKey,
    /// The element index is out of range.
    #[error("no future registered at index {0}")]
    NoSuchIndex(usize),
}
