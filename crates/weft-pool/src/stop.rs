//! Cooperative stop signalling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The requesting side of a cooperative stop signal.
///
/// One source fans out to any number of [`StopToken`]s; requesting a stop is
/// sticky and idempotent.
#[derive(Debug, Default, Clone)]
pub struct StopSource {
    flag: Arc<AtomicBool>,
}

impl StopSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every token handed out by this source.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// The observing side of a cooperative stop signal.
///
/// Long-running tasks poll this at convenient points and return early once
/// a stop has been requested. The contract is cooperative only: nothing is
/// interrupted on the task's behalf.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
