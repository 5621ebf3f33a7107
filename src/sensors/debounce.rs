//! Leading-edge debounce for a two-level contact.
//!
//! The first change seen (an edge notification or a polled level that
//! differs from the reported one) opens a window.  Everything inside the
//! window is ignored.  When the window has elapsed the line is re-read
//! once; if the level still differs from the last reported one it is
//! accepted and reported, otherwise the bounce is discarded.
//!
//! ```text
//!   level   ──┐ ┌┐ ┌───────────────
//!             └─┘└─┘
//!   window    |<---- 300 ms ---->|
//!   report                       ▲ detected = level at re-read
//! ```
//!
//! Consequence: two accepted reports are always at least one window apart
//! and always alternate.
//!
//! Time is monotonic milliseconds supplied by the caller; the type does no
//! I/O and holds no clock, so it is tested with synthetic timestamps.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    window_ms: u64,
    reported: bool,
    pending_since: Option<u64>,
}

impl Debouncer {
    /// `reported` is the level observers currently believe in.
    pub fn new(window_ms: u64, reported: bool) -> Self {
        Self {
            window_ms,
            reported,
            pending_since: None,
        }
    }

    /// Last level handed to observers.
    pub fn reported(&self) -> bool {
        self.reported
    }

    /// Monotonic time at which the open window closes, if one is open.
    pub fn deadline(&self) -> Option<u64> {
        self.pending_since.map(|since| since + self.window_ms)
    }

    /// Record an edge notification at `at_ms`.  Opens a window unless one
    /// is already open.
    pub fn mark_edge(&mut self, at_ms: u64) {
        if self.pending_since.is_none() {
            self.pending_since = Some(at_ms);
        }
    }

    /// Feed the current line level.  Returns the newly accepted level when
    /// a settled transition is confirmed.
    pub fn observe(&mut self, now_ms: u64, level: bool) -> Option<bool> {
        match self.pending_since {
            None => {
                if level != self.reported {
                    self.pending_since = Some(now_ms);
                }
                None
            }
            Some(since) if now_ms.saturating_sub(since) >= self.window_ms => {
                self.pending_since = None;
                if level == self.reported {
                    return None;
                }
                self.reported = level;
                Some(level)
            }
            Some(_) => None,
        }
    }

    /// Accept `level` without a window.  Used once at startup so the
    /// initial state reaches observers; returns it only if it differs.
    pub fn prime(&mut self, level: bool) -> Option<bool> {
        self.pending_since = None;
        if level == self.reported {
            return None;
        }
        self.reported = level;
        Some(level)
    }

    /// Drop any open window (line re-acquired, edges lost).
    pub fn reset_window(&mut self) {
        self.pending_since = None;
    }
}
