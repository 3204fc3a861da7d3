use thiserror::Error;

/// Contract violations when building a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// Ring capacities must be non-zero powers of two so that slot lookup
    /// is a single mask.
    #[error("ring capacity must be a power of two, got {0}")]
    BadCapacity(usize),
}
