use std::fmt::Debug;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Source of monotonic time for arrival stamps and retry deadlines.
pub trait TimeProvider: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// The system clock.
#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manual time provider for deterministic tests.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    pub fn set_time(&self, instant: Instant) {
        *self.instant.write().unwrap() = instant;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Instant {
        *self.instant.read().unwrap()
    }
}
