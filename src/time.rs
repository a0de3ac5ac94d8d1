use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Milliseconds since the Unix epoch, wall-clock.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Process-wide generator of the `arrival` ordinal (§4.1).
///
/// Returns strictly increasing microsecond-resolution integers across all
/// concurrent callers in the process, even when the wall clock regresses or
/// two calls land in the same microsecond. Design: `max(wall_micros,
/// last_returned + 1)`, guarded by a single atomic so the read-modify-write
/// is indivisible.
pub struct ArrivalClock {
    last: AtomicI64,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Returns the next arrival ordinal. Never regresses, never repeats.
    pub fn next(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = wall.max(prev.saturating_add(1));

            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for ArrivalClock {
    fn default() -> Self {
        Self::new()
    }
}
