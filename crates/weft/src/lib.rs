//! In-process concurrency toolkit.
//!
//! Three tightly coupled subsystems behind one façade:
//!
//! - **Futures** ([`weft_future`]): blocking [`Promise`]/[`Future`] pairs
//!   with chained continuations, error observers, and the aggregate
//!   [`Futures`] collection.
//! - **Pool** ([`weft_pool`]): a condvar-driven OS-thread [`ThreadPool`]
//!   accepting one-shot, cancelable, fallible, and data-parallel (`map`)
//!   submissions, each producing a future tied back to the pool.
//! - **Channels** ([`weft_channel`]): power-of-two [`Ring`] buffers with
//!   [`Source`]/[`Sink`] handles, write-side listeners, and
//!   [`connect`]/[`async_connect`] to bridge a producer to a consumer
//!   inline or through the pool.
//!
//! ```
//! use weft::{ThreadPool, FuturePoolExt};
//!
//! let pool = ThreadPool::new(2);
//! let answer = pool
//!     .run(|| 6 * 7)
//!     .unwrap()
//!     .then_on(&pool, |v| v.to_string())
//!     .wait()
//!     .unwrap();
//! assert_eq!(answer, "42");
//! pool.quit();
//! ```

pub use weft_future::{
    make_promise, DynError, Executor, Future, Futures, FuturesError, Promise, StateError,
    TaskError,
};

pub use weft_pool::{FuturePoolExt, PoolError, StopSource, StopToken, ThreadPool};

pub use weft_channel::{
    async_connect, channel, connect, connect_via, disconnect, mpsc_channel, spmc_channel,
    Connection, Reader, Ring, RingError, Sink, Source, Writer,
};

/// Free functions over the process-wide global pool.
pub mod pool {
    pub use weft_pool::{map, map_try, quit, run, run_cancelable, run_try, wait, wait_for};
}
