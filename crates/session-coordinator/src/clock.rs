//! Time sources for expiry checks.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source compared against token expiry claims.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time derived from tokio's monotonic clock.
///
/// Reads the wall clock once, then advances with `tokio::time::Instant`.
/// Immune to wall-clock jumps, and follows tokio's paused clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.started);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.origin + elapsed,
            Err(_) => Utc::now(),
        }
    }
}
