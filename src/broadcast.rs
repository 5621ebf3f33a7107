//! Status broadcaster: many producers, one FIFO consumer.
//!
//! Producers (alarm coordinator, capture pipeline, command handler) never
//! talk to the publish sink.  They enqueue a small [`Notice`] and return;
//! the consumer task drains the queue in order and, for each status
//! notice, composes a fresh [`StatusSnapshot`] from the [`StatusSource`]
//! at that moment.
//!
//! ```text
//!  AlarmCoordinator ─┐
//!  CapturePipeline  ─┼─ notify() ──▶ ┌──────────────┐ ──▶ bcast-consumer ──▶ PublishSink
//!  Command handler  ─┘   (blocks     │ Channel (32) │      compose snapshot
//!                         when full) └──────────────┘      from StatusSource
//! ```
//!
//! ## Shutdown
//!
//! [`StatusBroadcaster::shutdown`] closes the sender side, enqueues a
//! sentinel behind everything already queued, and joins the consumer with
//! a bound.  Closing and enqueueing share one gate, so a notice is either
//! refused or queued ahead of the sentinel.  Notices sent after close are
//! refused and logged.
//!
//! ## Backpressure
//!
//! A full queue blocks the producer until the consumer frees a slot or the
//! broadcaster closes.  Nothing is dropped.  A producer blocked longer than
//! the stall warning bound logs once and is counted in
//! [`StatusBroadcaster::stalls`].  Producers never hold a component lock
//! while notifying.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::app::events::{FrameUpdate, StatusCause, StatusSnapshot};
use crate::app::ports::{PublishSink, StatusSource};
use crate::config::SystemConfig;
use crate::drivers::worker::{Worker, lock};
use crate::error::WorkerError;

/// Queue depth.  Producers block beyond this.
pub const STATUS_QUEUE_DEPTH: usize = 32;

/// Retry period of a producer waiting on a full queue.
const FULL_QUEUE_POLL: Duration = Duration::from_millis(2);

/// One queued notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Status(StatusCause),
    Frame(FrameUpdate),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// A producer blocked this long on a full queue logs a stall warning.
    pub stall_warning: Duration,
    pub join_timeout: Duration,
}

impl BroadcastSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            stall_warning: Duration::from_millis(config.backpressure_warn_ms.into()),
            join_timeout: Duration::from_millis(config.join_timeout_ms.into()),
        }
    }
}

struct Shared {
    queue: Channel<CriticalSectionRawMutex, Notice, STATUS_QUEUE_DEPTH>,
    /// `true` once closed.  Held across every enqueue.
    gate: Mutex<bool>,
    stalls: AtomicU32,
}

enum Enqueue {
    Queued,
    Closed(Notice),
    Full(Notice),
}

impl Shared {
    fn try_enqueue(&self, notice: Notice) -> Enqueue {
        let closed = lock(&self.gate);
        if *closed {
            return Enqueue::Closed(notice);
        }
        match self.queue.try_send(notice) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(notice)) => Enqueue::Full(notice),
        }
    }

    /// Mark closed.  Returns the previous state.
    fn close(&self) -> bool {
        core::mem::replace(&mut *lock(&self.gate), true)
    }
}

// ── Producer side ─────────────────────────────────────────────

/// Cloneable producer handle.
#[derive(Clone)]
pub struct StatusSender {
    shared: Arc<Shared>,
    stall_warning: Duration,
}

impl StatusSender {
    /// Request a status snapshot publication.  Blocks while the queue is
    /// full.  Returns `false` only if the broadcaster is closed.
    pub fn notify(&self, cause: StatusCause) -> bool {
        self.send(Notice::Status(cause))
    }

    /// Queue a frame update for publication.
    pub fn publish_frame(&self, update: FrameUpdate) -> bool {
        self.send(Notice::Frame(update))
    }

    fn send(&self, mut notice: Notice) -> bool {
        let mut waiting_since: Option<Instant> = None;
        let mut warned = false;
        loop {
            notice = match self.shared.try_enqueue(notice) {
                Enqueue::Queued => {
                    if warned {
                        info!("BCAST: stalled producer resumed");
                    }
                    return true;
                }
                Enqueue::Closed(notice) => {
                    debug!("BCAST: closed, refusing {}", notice_kind(&notice));
                    return false;
                }
                Enqueue::Full(notice) => notice,
            };

            let since = *waiting_since.get_or_insert_with(|| {
                debug!("BCAST: queue full, producer waiting");
                Instant::now()
            });
            if !warned && since.elapsed() >= self.stall_warning {
                warned = true;
                let total = self.shared.stalls.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "BCAST: consumer stalled for {}ms, {} producer still waiting ({} stalls total)",
                    self.stall_warning.as_millis(),
                    notice_kind(&notice),
                    total
                );
            }
            std::thread::sleep(FULL_QUEUE_POLL);
        }
    }
}

fn notice_kind(notice: &Notice) -> &'static str {
    match notice {
        Notice::Status(_) => "status",
        Notice::Frame(_) => "frame",
        Notice::Shutdown => "shutdown",
    }
}

// ── Broadcaster ───────────────────────────────────────────────

pub struct StatusBroadcaster {
    shared: Arc<Shared>,
    settings: BroadcastSettings,
    worker: Mutex<Option<Worker>>,
}

impl StatusBroadcaster {
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Channel::new(),
                gate: Mutex::new(false),
                stalls: AtomicU32::new(0),
            }),
            settings,
            worker: Mutex::new(None),
        }
    }

    /// Producer handle.  Notices sent before [`start`](Self::start) wait
    /// in the queue.
    pub fn sender(&self) -> StatusSender {
        StatusSender {
            shared: Arc::clone(&self.shared),
            stall_warning: self.settings.stall_warning,
        }
    }

    /// Spawn the consumer.  A no-op if already running.
    pub fn start(&self, source: Arc<dyn StatusSource>, mut sink: Box<dyn PublishSink>) -> Result<(), WorkerError> {
        let mut slot = lock(&self.worker);
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let worker = Worker::spawn("bcast-consumer", move |stop| {
            let mut published: u64 = 0;
            loop {
                let next = future::block_on(future::or(
                    async { Some(shared.queue.receive().await) },
                    async {
                        stop.stopped().await;
                        None
                    },
                ));
                match next {
                    Some(Notice::Status(cause)) => {
                        let snapshot = StatusSnapshot {
                            cause,
                            alarm: source.alarm_state(),
                            camera: source.camera_status(),
                            detections: source.detections(),
                        };
                        sink.publish_status(&snapshot);
                        published += 1;
                    }
                    Some(Notice::Frame(update)) => {
                        sink.publish_frame(&update);
                        published += 1;
                    }
                    Some(Notice::Shutdown) | None => break,
                }
            }
            info!("BCAST: consumer exiting after {} publications", published);
        })?;
        info!("BCAST: consumer started");
        *slot = Some(worker);
        Ok(())
    }

    /// Close the queue, let the consumer drain what is ahead of the
    /// sentinel, and join it.  Idempotent.
    pub fn shutdown(&self) -> Result<(), WorkerError> {
        let already = self.shared.close();
        let Some(mut worker) = lock(&self.worker).take() else {
            if !already {
                self.shared.queue.clear();
            }
            return Ok(());
        };

        let queue = &self.shared.queue;
        let queued = future::block_on(future::or(
            async {
                queue.send(Notice::Shutdown).await;
                true
            },
            async {
                async_io_mini::Timer::after(self.settings.join_timeout).await;
                false
            },
        ));
        if !queued {
            error!("BCAST: could not enqueue shutdown sentinel, stopping consumer");
            return worker.stop(self.settings.join_timeout);
        }
        worker.join(self.settings.join_timeout)
    }

    /// Producers that waited past the stall warning since creation.
    pub fn stalls(&self) -> u32 {
        self.shared.stalls.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for StatusBroadcaster {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
