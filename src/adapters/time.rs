//! Time helpers.
//!
//! - [`unix_millis`]: wall-clock timestamp carried by events that leave
//!   the core (observers display it).
//! - [`MonotonicClock`]: milliseconds since construction, used for
//!   debounce and rate-limit arithmetic where wall-clock jumps (NTP sync
//!   on a Pi without RTC) must not matter.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.  Returns 0 if the clock is before
/// 1970, which only happens on an unsynced board without RTC.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Monotonic millisecond counter.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since this clock was created.
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
