//! Virtual-time environment.
//!
//! Time only moves when a test calls [`SimEnv::advance`] (or something awaits
//! [`Environment::sleep`], which advances instead of waiting). Clones share
//! one clock.

use std::{
    future::Future,
    ops::Sub,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use clubchat_core::Environment;

/// Wall-clock reading at virtual time zero: 2024-05-01T09:00:00Z.
const START_WALL_CLOCK_SECS: i64 = 1_714_554_000;

/// Virtual instant: time since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Virtual-time environment.
#[derive(Debug, Clone)]
pub struct SimEnv {
    elapsed: Arc<Mutex<Duration>>,
    start: DateTime<Utc>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Clock at zero, wall clock at 2024-05-01T09:00:00Z.
    pub fn new() -> Self {
        let start = DateTime::from_timestamp(START_WALL_CLOCK_SECS, 0).unwrap_or_default();
        Self::with_wall_clock(start)
    }

    /// Clock at zero with a chosen wall-clock start.
    pub fn with_wall_clock(start: DateTime<Utc>) -> Self {
        Self { elapsed: Arc::new(Mutex::new(Duration::ZERO)), start }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.start + TimeDelta::from_std(self.elapsed()).unwrap_or_default()
    }
}
