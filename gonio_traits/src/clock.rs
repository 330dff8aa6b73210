use std::time::{Duration, Instant};

/// Monotonic time source for settle deadlines.
///
/// Only `now()` is required; the deadline helpers are derived from it so a
/// substituted clock moves every deadline consistently.
pub trait Clock {
    fn now(&self) -> Instant;

    /// `now() + d`. Saturates at `now()` if the sum is not representable.
    fn deadline(&self, d: Duration) -> Instant {
        let now = self.now();
        now.checked_add(d).unwrap_or(now)
    }

    /// True once `deadline` has been reached.
    fn expired(&self, deadline: Instant) -> bool {
        self.now() >= deadline
    }

    /// Time left until `deadline`, zero once it has passed.
    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// Wall-clock monotonic time from `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
