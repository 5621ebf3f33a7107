//! Camera capture and rate-limited detection dispatch.
//!
//! Two worker threads share a [`CaptureState`]:
//!
//! ```text
//!  camera ──▶ capture (as fast as the device allows)
//!               │  stores every frame as `latest`
//!               │  at most once per interval:
//!               ▼
//!          mailbox (Signal, latest wins)
//!               │
//!               ▼
//!          detector ──▶ FrameAnalyzer ──▶ detections + processed frame
//!                                          └──▶ StatusSender::publish_frame
//! ```
//!
//! A slow or unreachable detection service only delays the detector
//! thread; the capture loop keeps reading, and `get_frame()` keeps
//! returning fresh frames.  Frames submitted while the detector is busy
//! overwrite each other in the mailbox, so detection never queues up.
//!
//! ## Degraded camera
//!
//! Read failures back off and retry.  After `reopen_after_failures`
//! consecutive failures the device is released and reopened, and the
//! pipeline reports `running: false` until a frame is read again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::adapters::time::{MonotonicClock, unix_millis};
use crate::app::events::{CameraStatus, FireDetection, FrameUpdate, StatusCause};
use crate::app::ports::{Analysis, CameraDevice, FrameAnalyzer};
use crate::broadcast::StatusSender;
use crate::config::SystemConfig;
use crate::drivers::worker::{FailureCounter, StopToken, Worker, lock};
use crate::error::{Error, WorkerError};

/// Extra join slack for the detector beyond one request timeout.
const DETECTOR_JOIN_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub detection_interval: Duration,
    pub frame_pause: Duration,
    pub read_failure_backoff: Duration,
    pub reopen_after_failures: u32,
    /// Upper bound of one `analyze` call; sizes the detector join.
    pub detection_timeout: Duration,
    pub join_timeout: Duration,
}

impl CaptureSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            width: config.frame_width,
            height: config.frame_height,
            detection_interval: Duration::from_millis(config.detection_interval_ms.into()),
            frame_pause: Duration::from_millis(config.frame_pause_ms.into()),
            read_failure_backoff: Duration::from_millis(config.read_failure_backoff_ms.into()),
            reopen_after_failures: config.reopen_after_failures,
            detection_timeout: Duration::from_millis(config.detection_timeout_ms.into()),
            join_timeout: Duration::from_millis(config.join_timeout_ms.into()),
        }
    }

    pub fn target_fps(&self) -> f32 {
        1.0 / self.detection_interval.as_secs_f32()
    }
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u64,
    pub captured_ms: u64,
    pub jpeg: Arc<[u8]>,
}

// ── Shared state ──────────────────────────────────────────────

#[derive(Default)]
struct Frames {
    latest: Option<Frame>,
    processed: Option<Arc<[u8]>>,
    detections: Vec<FireDetection>,
    resolution: (u32, u32),
}

/// State written by the capture workers and read by everyone else.
pub struct CaptureState {
    running: AtomicBool,
    target_fps: f32,
    frames: Mutex<Frames>,
}

impl CaptureState {
    fn new(target_fps: f32) -> Self {
        Self {
            running: AtomicBool::new(false),
            target_fps,
            frames: Mutex::new(Frames::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel) != running
    }

    pub fn camera_status(&self) -> CameraStatus {
        let frames = lock(&self.frames);
        CameraStatus {
            running: self.is_running(),
            target_fps: self.target_fps,
            resolution: frames.resolution,
            detection_count: frames.detections.len(),
        }
    }

    pub fn detections(&self) -> Vec<FireDetection> {
        lock(&self.frames).detections.clone()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        lock(&self.frames).latest.clone()
    }

    /// Latest raw frame, base64-encoded.
    pub fn latest_frame_b64(&self) -> Option<String> {
        let jpeg = lock(&self.frames).latest.as_ref().map(|f| Arc::clone(&f.jpeg))?;
        Some(BASE64.encode(jpeg))
    }

    fn store_frame(&self, frame: Frame) {
        lock(&self.frames).latest = Some(frame);
    }

    fn set_resolution(&self, resolution: (u32, u32)) {
        lock(&self.frames).resolution = resolution;
    }

    /// Drop the current detections.  Returns `true` if there were any.
    fn clear_detections(&self) -> bool {
        let mut frames = lock(&self.frames);
        let had = !frames.detections.is_empty();
        frames.detections.clear();
        had
    }

    /// Record a successful analysis of `frame` and build the update to publish.
    fn apply_analysis(&self, frame: &Frame, analysis: Analysis) -> FrameUpdate {
        let mut frames = lock(&self.frames);
        if let Some(jpeg) = analysis.processed_jpeg {
            frames.processed = Some(jpeg.into());
        }
        frames.detections = analysis.detections;
        FrameUpdate {
            raw_frame_b64: Some(BASE64.encode(&frame.jpeg)),
            processed_frame_b64: frames.processed.as_ref().map(|p| BASE64.encode(p)),
            detections: frames.detections.clone(),
        }
    }

    fn reset(&self) {
        self.running.store(false, Ordering::Release);
        *lock(&self.frames) = Frames::default();
    }
}

type Mailbox = Signal<CriticalSectionRawMutex, Frame>;

// ── Pipeline ──────────────────────────────────────────────────

struct Workers {
    capture: Worker,
    detector: Worker,
}

pub struct CapturePipeline {
    settings: CaptureSettings,
    camera: Arc<Mutex<Box<dyn CameraDevice>>>,
    analyzer: Arc<Mutex<Box<dyn FrameAnalyzer>>>,
    state: Arc<CaptureState>,
    notifier: StatusSender,
    workers: Mutex<Option<Workers>>,
}

impl CapturePipeline {
    pub fn new(
        settings: CaptureSettings,
        camera: Box<dyn CameraDevice>,
        analyzer: Box<dyn FrameAnalyzer>,
        notifier: StatusSender,
    ) -> Self {
        Self {
            state: Arc::new(CaptureState::new(settings.target_fps())),
            settings,
            camera: Arc::new(Mutex::new(camera)),
            analyzer: Arc::new(Mutex::new(analyzer)),
            notifier,
            workers: Mutex::new(None),
        }
    }

    /// Open the camera and start both workers.  Fails fast if the device
    /// cannot be opened; nothing is left running in that case.
    pub fn start(&self) -> Result<(), Error> {
        let mut slot = lock(&self.workers);
        if slot.is_some() {
            debug!("CAPTURE: start ignored, already running");
            return Ok(());
        }

        let resolution = lock(&self.camera)
            .open(self.settings.width, self.settings.height)
            .inspect_err(|e| error!("CAPTURE: {}", e))?;
        info!(
            "CAPTURE: camera opened at {}x{}, detection at {:.1} fps",
            resolution.0,
            resolution.1,
            self.settings.target_fps()
        );
        self.state.set_resolution(resolution);
        self.state.set_running(true);

        let mailbox = Arc::new(Mailbox::new());
        let workers = self.spawn_workers(&mailbox).inspect_err(|_| {
            lock(&self.camera).release();
            self.state.reset();
        })?;
        *slot = Some(workers);
        drop(slot);

        self.notifier.notify(StatusCause::Camera);
        Ok(())
    }

    fn spawn_workers(&self, mailbox: &Arc<Mailbox>) -> Result<Workers, WorkerError> {
        let detector = {
            let analyzer = Arc::clone(&self.analyzer);
            let state = Arc::clone(&self.state);
            let mailbox = Arc::clone(mailbox);
            let notifier = self.notifier.clone();
            Worker::spawn("detector", move |stop| {
                detection_loop(&analyzer, &state, &mailbox, &notifier, &stop);
            })?
        };
        let capture = {
            let settings = self.settings;
            let camera = Arc::clone(&self.camera);
            let state = Arc::clone(&self.state);
            let mailbox = Arc::clone(mailbox);
            let notifier = self.notifier.clone();
            Worker::spawn("capture", move |stop| {
                CaptureLoop::new(settings).run(&camera, &state, &mailbox, &notifier, &stop);
            })?
        };
        Ok(Workers { capture, detector })
    }

    /// Stop both workers (bounded), release the camera.  Safe if `start`
    /// never succeeded; returns after the workers exited.
    pub fn stop(&self) -> Result<(), WorkerError> {
        let Some(mut workers) = lock(&self.workers).take() else {
            return Ok(());
        };
        let capture = workers.capture.stop(self.settings.join_timeout);
        let detector = workers
            .detector
            .stop(self.settings.detection_timeout + DETECTOR_JOIN_SLACK);

        lock(&self.camera).release();
        self.state.reset();
        info!("CAPTURE: stopped, camera released");
        self.notifier.notify(StatusCause::Camera);
        capture.and(detector)
    }

    /// Latest raw frame, base64-encoded.
    pub fn get_frame(&self) -> Option<String> {
        self.state.latest_frame_b64()
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.state.camera_status()
    }

    pub fn detections(&self) -> Vec<FireDetection> {
        self.state.detections()
    }

    /// Shared read handle for status composition.
    pub fn state(&self) -> Arc<CaptureState> {
        Arc::clone(&self.state)
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ── Capture worker ────────────────────────────────────────────

struct CaptureLoop {
    settings: CaptureSettings,
    clock: MonotonicClock,
    failures: FailureCounter,
    last_submit_ms: Option<u64>,
    seq: u64,
    degraded: bool,
}

impl CaptureLoop {
    fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            clock: MonotonicClock::new(),
            failures: FailureCounter::new(settings.reopen_after_failures),
            last_submit_ms: None,
            seq: 0,
            degraded: false,
        }
    }

    fn run(
        mut self,
        camera: &Mutex<Box<dyn CameraDevice>>,
        state: &CaptureState,
        mailbox: &Mailbox,
        notifier: &StatusSender,
        stop: &StopToken,
    ) {
        let interval_ms = self.settings.detection_interval.as_millis() as u64;

        while !stop.is_requested() {
            let read = lock(camera).read_frame();
            let pause = match read {
                Ok(jpeg) => {
                    let previous = self.failures.reset();
                    if previous > 0 {
                        info!("CAPTURE: frames flowing again after {} failed read(s)", previous);
                    }
                    if self.degraded {
                        self.degraded = false;
                        if state.set_running(true) {
                            notifier.notify(StatusCause::Camera);
                        }
                    }

                    self.seq += 1;
                    let frame = Frame {
                        seq: self.seq,
                        captured_ms: unix_millis(),
                        jpeg: jpeg.into(),
                    };
                    let now = self.clock.now_ms();
                    if self
                        .last_submit_ms
                        .is_none_or(|last| now.saturating_sub(last) >= interval_ms)
                    {
                        self.last_submit_ms = Some(now);
                        mailbox.signal(frame.clone());
                    }
                    state.store_frame(frame);
                    self.settings.frame_pause
                }
                Err(e) => {
                    if self.failures.record() {
                        warn!("CAPTURE: {} ({} consecutive)", e, self.failures.count());
                    }
                    if self.failures.count() >= self.settings.reopen_after_failures {
                        self.reopen(camera, state, notifier);
                    }
                    self.settings.read_failure_backoff
                }
            };
            if stop.sleep_blocking(pause) {
                break;
            }
        }
        debug!("CAPTURE: loop exited after {} frame(s)", self.seq);
    }

    fn reopen(&mut self, camera: &Mutex<Box<dyn CameraDevice>>, state: &CaptureState, notifier: &StatusSender) {
        if !self.degraded {
            self.degraded = true;
            if state.set_running(false) {
                notifier.notify(StatusCause::Camera);
            }
        }
        self.failures.reset();

        let mut cam = lock(camera);
        cam.release();
        match cam.open(self.settings.width, self.settings.height) {
            Ok(resolution) => {
                info!("CAPTURE: camera reopened at {}x{}", resolution.0, resolution.1);
                state.set_resolution(resolution);
            }
            Err(e) => warn!("CAPTURE: reopen failed: {}", e),
        }
    }
}

// ── Detector worker ───────────────────────────────────────────

fn detection_loop(
    analyzer: &Mutex<Box<dyn FrameAnalyzer>>,
    state: &CaptureState,
    mailbox: &Mailbox,
    notifier: &StatusSender,
    stop: &StopToken,
) {
    loop {
        let next = future::block_on(future::or(
            async { Some(mailbox.wait().await) },
            async {
                stop.stopped().await;
                None
            },
        ));
        let Some(frame) = next else {
            break;
        };

        let result = lock(analyzer).analyze(&frame.jpeg);
        if stop.is_requested() {
            debug!("CAPTURE: dropping detection result for frame {} after stop", frame.seq);
            break;
        }
        match result {
            Ok(analysis) => {
                let update = state.apply_analysis(&frame, analysis);
                notifier.publish_frame(update);
            }
            Err(_) => {
                if state.clear_detections() {
                    notifier.notify(StatusCause::Camera);
                }
            }
        }
    }
}
