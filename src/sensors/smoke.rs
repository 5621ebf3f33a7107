//! Smoke detector contact monitor.
//!
//! ## Hardware
//!
//! The detector's alarm relay is wired to one GPIO input (BCM 27 by
//! default).  Line driver, edge and bias are deployment configuration; the
//! monitor only sees an [`InputLineProvider`].
//!
//! ## Task
//!
//! One worker thread (`smoke-monitor`) owns the line for its whole life:
//!
//! ```text
//!   ┌─────────┐  ok   ┌──────────────┐ fault ┌──────────┐
//!   │ acquire │──────▶│ watch (edges │──────▶│ release  │
//!   └─────────┘       │  or polling) │       │ + backoff│
//!        ▲  err       └──────────────┘       └────┬─────┘
//!        └── backoff 5 s ◀──────────────────────────┘
//! ```
//!
//! Acquisition is retried forever with a fixed backoff until `stop()`.
//! In interrupt mode the driver only enqueues timestamped edges; debounce
//! and the level re-read happen here.  A slow heartbeat re-read covers
//! edges the driver dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_lite::future;
use log::{debug, info, warn};

use crate::adapters::time::{MonotonicClock, unix_millis};
use crate::app::events::SmokeEvent;
use crate::app::ports::{InputLine, InputLineProvider, SmokeObserver};
use crate::config::{SmokeReadMode, SystemConfig};
use crate::drivers::worker::{FailureCounter, StopToken, Worker, lock};
use crate::error::{LineError, WorkerError};
use crate::events::EdgeQueue;
use crate::sensors::debounce::Debouncer;

/// Heartbeat re-read period in interrupt mode.
const HEARTBEAT_MS: u64 = 1000;

/// Log the first acquisition failure, then one in twelve (once a minute
/// at the default backoff).
const ACQUIRE_LOG_EVERY: u32 = 12;

/// Timing for the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    pub read_mode: SmokeReadMode,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub retry_backoff: Duration,
    pub heartbeat: Duration,
    pub join_timeout: Duration,
}

impl SensorSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            read_mode: config.smoke_read_mode,
            poll_interval: Duration::from_millis(config.smoke_poll_interval_ms.into()),
            debounce: Duration::from_millis(config.smoke_debounce_ms.into()),
            retry_backoff: Duration::from_millis(config.line_retry_backoff_ms.into()),
            heartbeat: Duration::from_millis(HEARTBEAT_MS),
            join_timeout: Duration::from_millis(config.join_timeout_ms.into()),
        }
    }
}

type SharedProvider = Arc<Mutex<Box<dyn InputLineProvider>>>;

/// Watches the smoke input and reports debounced transitions.
pub struct SensorMonitor {
    settings: SensorSettings,
    provider: SharedProvider,
    clock: MonotonicClock,
    worker: Mutex<Option<Worker>>,
}

impl SensorMonitor {
    pub fn new(settings: SensorSettings, provider: Box<dyn InputLineProvider>) -> Self {
        Self {
            settings,
            provider: Arc::new(Mutex::new(provider)),
            clock: MonotonicClock::new(),
            worker: Mutex::new(None),
        }
    }

    /// Begin monitoring.  A no-op if already running.
    pub fn start(&self, observer: Arc<dyn SmokeObserver>) -> Result<(), WorkerError> {
        let mut slot = lock(&self.worker);
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!("SMOKE: start ignored, already running");
            return Ok(());
        }

        let settings = self.settings;
        let provider = Arc::clone(&self.provider);
        let clock = self.clock;
        let worker = Worker::spawn("smoke-monitor", move |stop| {
            MonitorTask::new(settings, clock, observer).run(&provider, &stop);
        })?;
        info!(
            "SMOKE: monitor started ({:?}, debounce {}ms)",
            settings.read_mode,
            settings.debounce.as_millis()
        );
        *slot = Some(worker);
        Ok(())
    }

    /// Stop monitoring and release the line.  Safe if never started;
    /// returns once the task has exited.
    pub fn stop(&self) -> Result<(), WorkerError> {
        let Some(mut worker) = lock(&self.worker).take() else {
            return Ok(());
        };
        worker.stop(self.settings.join_timeout)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for SensorMonitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ── Monitor task ──────────────────────────────────────────────

enum Wake {
    Edge(u64),
    Timer,
    Stop,
}

struct MonitorTask {
    settings: SensorSettings,
    clock: MonotonicClock,
    observer: Arc<dyn SmokeObserver>,
    edges: EdgeQueue,
    debounce: Debouncer,
    primed: bool,
}

impl MonitorTask {
    fn new(settings: SensorSettings, clock: MonotonicClock, observer: Arc<dyn SmokeObserver>) -> Self {
        Self {
            settings,
            clock,
            observer,
            edges: EdgeQueue::new(clock),
            debounce: Debouncer::new(settings.debounce.as_millis() as u64, false),
            primed: false,
        }
    }

    fn run(mut self, provider: &SharedProvider, stop: &StopToken) {
        let mut failures = FailureCounter::new(ACQUIRE_LOG_EVERY);

        while !stop.is_requested() {
            let acquired = lock(provider).acquire(self.edges.sender());
            let mut line = match acquired {
                Ok(line) => line,
                Err(e) => {
                    if failures.record() {
                        warn!(
                            "SMOKE: line acquisition failed ({}), attempt {}, retrying in {}ms",
                            e,
                            failures.count(),
                            self.settings.retry_backoff.as_millis()
                        );
                    }
                    if stop.sleep_blocking(self.settings.retry_backoff) {
                        break;
                    }
                    continue;
                }
            };
            let previous = failures.reset();
            if previous > 0 {
                info!("SMOKE: line acquired after {} failed attempts", previous);
            } else {
                info!("SMOKE: line acquired");
            }

            self.edges.clear();
            self.debounce.reset_window();

            let outcome = match self.settings.read_mode {
                SmokeReadMode::Interrupt => self.watch_edges(line.as_mut(), stop),
                SmokeReadMode::Polling => self.watch_polling(line.as_mut(), stop),
            };
            drop(line);

            match outcome {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "SMOKE: line fault ({}), released; re-acquiring in {}ms",
                        e,
                        self.settings.retry_backoff.as_millis()
                    );
                    if stop.sleep_blocking(self.settings.retry_backoff) {
                        break;
                    }
                }
            }
        }
        info!("SMOKE: monitor stopped, line released");
    }

    /// Read the line once on (re)acquisition.  The very first read is
    /// reported without a window so observers learn the initial state.
    fn initial_read(&mut self, line: &mut dyn InputLine) -> Result<(), LineError> {
        let level = line.read_level()?;
        let accepted = if self.primed {
            self.debounce.observe(self.clock.now_ms(), level)
        } else {
            self.primed = true;
            self.debounce.prime(level)
        };
        self.report(accepted);
        Ok(())
    }

    /// Interrupt mode.  `Ok(())` means a stop was requested.
    fn watch_edges(&mut self, line: &mut dyn InputLine, stop: &StopToken) -> Result<(), LineError> {
        self.initial_read(line)?;
        let heartbeat_ms = self.settings.heartbeat.as_millis() as u64;

        loop {
            let now = self.clock.now_ms();
            let wait_ms = self
                .debounce
                .deadline()
                .map_or(heartbeat_ms, |deadline| deadline.saturating_sub(now));

            let edges = &self.edges;
            let wake = future::block_on(future::or(
                async { Wake::Edge(edges.recv().await.at_ms) },
                async {
                    if stop.sleep(Duration::from_millis(wait_ms)).await {
                        Wake::Stop
                    } else {
                        Wake::Timer
                    }
                },
            ));

            match wake {
                Wake::Stop => return Ok(()),
                Wake::Edge(at_ms) => {
                    self.debounce.mark_edge(at_ms);
                    while let Some(ev) = self.edges.try_recv() {
                        self.debounce.mark_edge(ev.at_ms);
                    }
                }
                Wake::Timer => {
                    if self.edges.take_overflow() {
                        debug!("SMOKE: edge queue overflowed, re-reading line");
                    }
                    let level = line.read_level()?;
                    let accepted = self.debounce.observe(self.clock.now_ms(), level);
                    self.report(accepted);
                }
            }
        }
    }

    /// Polling mode.  `Ok(())` means a stop was requested.
    fn watch_polling(&mut self, line: &mut dyn InputLine, stop: &StopToken) -> Result<(), LineError> {
        self.initial_read(line)?;
        loop {
            if stop.sleep_blocking(self.settings.poll_interval) {
                return Ok(());
            }
            let level = line.read_level()?;
            let accepted = self.debounce.observe(self.clock.now_ms(), level);
            self.report(accepted);
        }
    }

    fn report(&self, accepted: Option<bool>) {
        let Some(detected) = accepted else {
            return;
        };
        if detected {
            warn!("SMOKE: smoke detected");
        } else {
            info!("SMOKE: smoke cleared");
        }
        self.observer.on_smoke(SmokeEvent {
            timestamp_ms: unix_millis(),
            detected,
        });
    }
}
