//! Time source used for timeout comparison

use std::time::Instant;

/// Supplies the current instant to containers and the watchdog.
///
/// The scheduler owns the time source so timeouts can be driven
/// deterministically in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
