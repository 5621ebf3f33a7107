//! Named background workers with cooperative stop and bounded join.
//!
//! Every long-running loop in the core (smoke monitor, alarm pulse, capture,
//! detection dispatch, broadcast consumer) runs on its own OS thread spawned
//! through [`Worker::spawn`].  The loop receives a shared [`StopToken`] and
//! must only block in cancellable waits:
//!
//! ```text
//!   owner ── stop(timeout) ──▶ StopToken::request() ──▶ wakes sleep()/wait()
//!     │                                                      │
//!     └──── polls JoinHandle::is_finished() until deadline ◀─┘ loop returns
//! ```
//!
//! Waits are `futures-lite` futures driven by `block_on` on the worker
//! thread, with `async-io-mini` timers, so a stop request interrupts a
//! half-second pulse sleep immediately instead of after it elapses.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, info, warn};

use crate::error::WorkerError;

/// Poll period while waiting for a stopped thread to finish.
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Join bound used when a [`Worker`] is dropped without an explicit stop.
const DROP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ── StopToken ────────────────────────────────────────────────

/// Cooperative cancellation flag shared between an owner and one worker.
///
/// Only the worker thread waits on the token; the owner only requests.
pub struct StopToken {
    requested: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Ask the worker to stop.  Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.wake.signal(());
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sleep for `period` unless a stop is requested first.
    /// Returns `true` if the worker should exit.
    pub async fn sleep(&self, period: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        future::or(
            async {
                self.wake.wait().await;
                true
            },
            async {
                async_io_mini::Timer::after(period).await;
                false
            },
        )
        .await
            || self.is_requested()
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        while !self.is_requested() {
            self.wake.wait().await;
        }
    }

    /// Blocking form of [`sleep`](Self::sleep) for synchronous loops.
    pub fn sleep_blocking(&self, period: Duration) -> bool {
        future::block_on(self.sleep(period))
    }
}

// ── Worker ───────────────────────────────────────────────────

/// Owning handle of one background thread.
pub struct Worker {
    name: &'static str,
    stop: Arc<StopToken>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread named `name`.
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce(Arc<StopToken>) + Send + 'static,
    {
        let stop = Arc::new(StopToken::new());
        let token = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body(token))
            .map_err(|e| {
                warn!("Worker '{}' spawn failed: {}", name, e);
                WorkerError::SpawnFailed(name)
            })?;
        debug!("Spawned worker '{}'", name);
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` once the thread body has returned (or was never running).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request a stop and wait at most `timeout` for the thread to exit.
    ///
    /// Idempotent: a second call on a joined worker returns `Ok(())`.
    /// On timeout the thread is detached and keeps its stop request.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        self.stop.request();
        self.wait(timeout)
    }

    /// Wait at most `timeout` for the body to return on its own (a queue
    /// sentinel, a finished job).  On timeout a stop is requested and the
    /// thread is detached.
    pub fn join(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        let res = self.wait(timeout);
        if res.is_err() {
            self.stop.request();
        }
        res
    }

    fn wait(&mut self, timeout: Duration) -> Result<(), WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if handle.thread().id() == std::thread::current().id() {
            // Stopping from inside the worker itself: it exits when the
            // current call returns to its loop.
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker '{}' did not stop within {}ms, detaching",
                    self.name,
                    timeout.as_millis()
                );
                return Err(WorkerError::JoinTimeout(self.name));
            }
            std::thread::sleep(JOIN_POLL);
        }

        handle
            .join()
            .map_err(|_| WorkerError::Panicked(self.name))?;
        info!("Worker '{}' stopped", self.name);
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop(DROP_JOIN_TIMEOUT);
        }
    }
}

// ── Locking ──────────────────────────────────────────────────

/// Lock `m`, recovering the guard if a previous holder panicked.  All
/// state behind the crate's mutexes is plain data that stays consistent
/// between statements.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Failure log limiter ──────────────────────────────────────

/// Counts consecutive failures of a retried operation and decides which
/// of them get a log line: the first, then every `every`-th.
#[derive(Debug, Clone, Copy)]
pub struct FailureCounter {
    count: u32,
    every: u32,
}

impl FailureCounter {
    pub fn new(every: u32) -> Self {
        Self {
            count: 0,
            every: every.max(1),
        }
    }

    /// Record one failure.  Returns `true` if it should be logged.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count == 1 || self.count % self.every == 0
    }

    /// Consecutive failures so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Clear after a success.  Returns how many failures preceded it.
    pub fn reset(&mut self) -> u32 {
        core::mem::take(&mut self.count)
    }
}
