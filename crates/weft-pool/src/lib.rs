//! A thread pool for one-shot and data-parallel work, producing
//! [`weft_future::Future`]s for asynchronous chaining.
//!
//! Workers are plain OS threads parked on a condition variable over a FIFO
//! task queue. Every submitted callable owns a promise; the returned future
//! carries a back-pointer to the pool, so continuations can hop onto a
//! worker with `async_then` (or explicitly with
//! [`FuturePoolExt::then_on`]).
//!
//! Cancellation is strictly cooperative: tasks submitted with
//! [`ThreadPool::run_cancelable`] receive a [`StopToken`] to poll; the pool
//! never interrupts a running task.
//!
//! A lazily constructed process-wide pool is available through
//! [`ThreadPool::global`] and the module-level [`run`]/[`map`]/[`wait`]/
//! [`quit`] conveniences; its thread count may be configured with
//! [`ThreadPool::set_global_threads`] **before** first use.

mod error;
mod pool;
mod stop;
mod task;

pub use error::PoolError;
pub use pool::{
    map, map_try, quit, run, run_cancelable, run_try, wait, wait_for, FuturePoolExt, ThreadPool,
};
pub use stop::{StopSource, StopToken};
