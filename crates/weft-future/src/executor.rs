//! The seam between futures and whatever runs their continuations.

use crate::error::TaskError;

/// Something that can run boxed jobs on other threads.
///
/// Future states keep a `Weak` reference to their executor (a thread pool
/// installs itself here when it hands out a future), so continuations can be
/// hopped onto the pool with [`Future::async_then`](crate::Future::async_then)
/// without the future keeping the pool alive.
pub trait Executor: Send + Sync {
    /// Enqueue a job for asynchronous execution.
    ///
    /// Returns [`TaskError::Stopped`] when the executor no longer accepts
    /// work.
    fn execute(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), TaskError>;
}
