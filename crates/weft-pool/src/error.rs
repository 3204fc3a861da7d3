use thiserror::Error;

/// Contract violations on a thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// `quit` has been called; the pool no longer accepts submissions.
    #[error("cannot enqueue on a stopped pool")]
    Stopped,
    /// The global pool was already built when its configuration was changed.
    #[error("global pool is already initialized")]
    GlobalAlreadyInitialized,
}
