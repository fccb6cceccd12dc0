//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources. Production uses the system
//! clocks; tests use a virtual clock that only moves when told to.

use std::{future::Future, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock()` is only used for values shown to people or sent to the
///   server (message timestamps), never for timeouts
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`; simulation uses a virtual
    /// instant.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines never do.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Current calendar time in UTC.
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Environment backed by the operating system clocks and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
