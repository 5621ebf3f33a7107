//! Interrupt-driven edge queue.
//!
//! Line drivers call [`EdgeSender::push`] from their interrupt context;
//! that is all an interrupt handler is allowed to do.  The smoke monitor
//! task drains the queue and runs the debounce state machine on its own
//! thread.
//!
//! ```text
//! ┌─────────────┐  push()   ┌──────────────────┐  recv()  ┌──────────────┐
//! │ GPIO edge   │──────────▶│  Edge Queue      │─────────▶│ Smoke monitor│
//! │ callback    │ (try_send)│  (bounded, 16)   │          │ (debounce)   │
//! └─────────────┘           └──────────────────┘          └──────────────┘
//! ```
//!
//! A full queue never blocks the interrupt context.  The edge is dropped,
//! the overflow flag is raised, and the consumer re-reads the line level
//! on its next pass, so the settled state is still observed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::adapters::time::MonotonicClock;

/// Maximum number of pending edges.  A contact bouncing for the whole
/// debounce window produces far fewer than this before the consumer runs.
pub const EDGE_QUEUE_CAP: usize = 16;

/// One hardware edge, stamped with monotonic milliseconds at interrupt time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub at_ms: u64,
}

struct Shared {
    channel: Channel<CriticalSectionRawMutex, EdgeEvent, EDGE_QUEUE_CAP>,
    overflowed: AtomicBool,
    dropped: AtomicU32,
}

/// Owner side of the queue; hands out senders and consumes edges.
pub struct EdgeQueue {
    shared: Arc<Shared>,
    clock: MonotonicClock,
}

impl EdgeQueue {
    /// Create a queue whose timestamps share `clock`'s time base.
    pub fn new(clock: MonotonicClock) -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: Channel::new(),
                overflowed: AtomicBool::new(false),
                dropped: AtomicU32::new(0),
            }),
            clock,
        }
    }

    /// Producer handle for a line driver.
    pub fn sender(&self) -> EdgeSender {
        EdgeSender {
            shared: Arc::clone(&self.shared),
            clock: self.clock,
        }
    }

    /// Wait for the next edge.
    pub async fn recv(&self) -> EdgeEvent {
        self.shared.channel.receive().await
    }

    /// Pop the next edge without waiting.
    pub fn try_recv(&self) -> Option<EdgeEvent> {
        self.shared.channel.try_receive().ok()
    }

    /// Discard everything pending (used when the line is re-acquired).
    pub fn clear(&self) {
        self.shared.channel.clear();
        self.shared.overflowed.store(false, Ordering::Relaxed);
    }

    /// `true` once if edges were dropped since the last call.
    pub fn take_overflow(&self) -> bool {
        self.shared.overflowed.swap(false, Ordering::AcqRel)
    }

    /// Total edges dropped on a full queue since creation.
    pub fn dropped(&self) -> u32 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.shared.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.channel.is_empty()
    }
}

/// Interrupt-context producer.  Cheap to clone; never blocks.
#[derive(Clone)]
pub struct EdgeSender {
    shared: Arc<Shared>,
    clock: MonotonicClock,
}

impl EdgeSender {
    /// Enqueue an edge stamped with the current time.
    /// Returns `false` if the queue was full and the edge was dropped.
    pub fn push(&self) -> bool {
        self.push_at(self.clock.now_ms())
    }

    /// Enqueue an edge with an explicit timestamp.
    pub fn push_at(&self, at_ms: u64) -> bool {
        if self.shared.channel.try_send(EdgeEvent { at_ms }).is_ok() {
            return true;
        }
        self.shared.overflowed.store(true, Ordering::Release);
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }
}
