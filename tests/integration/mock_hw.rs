//! Mock hardware and collaborators for integration tests.
//!
//! Records every output write and every publication so tests can assert
//! on the full history without touching real GPIO or the network.  The
//! smoke input and the camera are the crate's own simulated devices,
//! scripted through their control handles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use smokewatch::adapters::sim::{SimCamera, SimCameraControl, SimInputProvider, SimLine};
use smokewatch::app::events::{FireDetection, FrameUpdate, StatusCause, StatusSnapshot};
use smokewatch::app::ports::{DetectorTransport, OutputLine, OutputLineProvider, PublishSink};
use smokewatch::app::service::Hardware;
use smokewatch::config::SystemConfig;
use smokewatch::error::{DetectionError, LineError};
use smokewatch::vision::detection::{DetectRequest, DetectResponse};

// ── Timing helpers ────────────────────────────────────────────

/// Short timings so lifecycle tests finish quickly.  Still valid.
pub fn fast_config() -> SystemConfig {
    SystemConfig {
        smoke_poll_interval_ms: 20,
        smoke_debounce_ms: 300,
        line_retry_backoff_ms: 50,
        pulse_half_period_ms: 50,
        detection_interval_ms: 100,
        frame_pause_ms: 5,
        read_failure_backoff_ms: 10,
        reopen_after_failures: 3,
        detection_timeout_ms: 200,
        detector_url: "http://127.0.0.1:9/detect".to_string(),
        join_timeout_ms: 1000,
        backpressure_warn_ms: 1000,
        ..SystemConfig::default()
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn detection(confidence: f32) -> FireDetection {
    FireDetection {
        bbox: [10.0, 10.0, 50.0, 50.0],
        confidence,
        class_id: 0,
    }
}

// ── Recording output line ─────────────────────────────────────

#[derive(Default)]
struct OutputLog {
    writes: Vec<(Instant, bool)>,
    acquires: u32,
    fail_writes: u32,
}

/// Output line provider that records every write with its time.
#[derive(Clone, Default)]
pub struct RecordingOutput {
    log: Arc<Mutex<OutputLog>>,
}

#[allow(dead_code)]
impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> Box<dyn OutputLineProvider> {
        Box::new(self.clone())
    }

    /// Last written level; low if never written.
    pub fn level(&self) -> bool {
        self.log.lock().unwrap().writes.last().is_some_and(|(_, high)| *high)
    }

    pub fn writes(&self) -> Vec<bool> {
        self.log.lock().unwrap().writes.iter().map(|(_, h)| *h).collect()
    }

    pub fn write_count(&self) -> usize {
        self.log.lock().unwrap().writes.len()
    }

    /// Writes that happened at or after `t`.
    pub fn writes_since(&self, t: Instant) -> Vec<bool> {
        self.log
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(at, _)| *at >= t)
            .map(|(_, h)| *h)
            .collect()
    }

    pub fn rising_edges(&self) -> usize {
        let writes = self.writes();
        let mut prev = false;
        writes
            .into_iter()
            .filter(|&h| {
                let rising = h && !prev;
                prev = h;
                rising
            })
            .count()
    }

    pub fn acquires(&self) -> u32 {
        self.log.lock().unwrap().acquires
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.log.lock().unwrap().fail_writes = n;
    }
}

struct RecordingLine {
    log: Arc<Mutex<OutputLog>>,
}

impl OutputLine for RecordingLine {
    fn drive(&mut self, high: bool) -> Result<(), LineError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_writes > 0 {
            log.fail_writes -= 1;
            return Err(LineError::WriteFailed);
        }
        log.writes.push((Instant::now(), high));
        Ok(())
    }
}

impl OutputLineProvider for RecordingOutput {
    fn acquire(&mut self) -> Result<Box<dyn OutputLine>, LineError> {
        self.log.lock().unwrap().acquires += 1;
        Ok(Box::new(RecordingLine {
            log: Arc::clone(&self.log),
        }))
    }
}

// ── Scripted detector ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply {
    Detections(Vec<FireDetection>),
    Processed(Vec<FireDetection>, String),
    Fail(DetectionError),
    /// Block for the whole request timeout, then time out.
    Hang,
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
    calls: u32,
}

/// Detection transport answering from a script.  Once the queue is empty
/// the fallback reply repeats; with no fallback every call returns no
/// detections.
#[derive(Clone, Default)]
pub struct ScriptedDetector {
    script: Arc<Mutex<Script>>,
}

#[allow(dead_code)]
impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(reply: Reply) -> Self {
        let d = Self::default();
        d.script.lock().unwrap().fallback = Some(reply);
        d
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().queued.push_back(reply);
    }

    pub fn calls(&self) -> u32 {
        self.script.lock().unwrap().calls
    }
}

impl DetectorTransport for ScriptedDetector {
    fn submit(&self, request: &DetectRequest<'_>, timeout: Duration) -> Result<DetectResponse, DetectionError> {
        assert!(!request.image.is_empty(), "frame must be sent base64-encoded");
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.calls += 1;
            script
                .queued
                .pop_front()
                .or_else(|| script.fallback.clone())
                .unwrap_or(Reply::Detections(Vec::new()))
        };
        match reply {
            Reply::Detections(detections) => Ok(DetectResponse {
                detections,
                processed_frame: None,
            }),
            Reply::Processed(detections, processed) => Ok(DetectResponse {
                detections,
                processed_frame: Some(processed),
            }),
            Reply::Fail(e) => Err(e),
            Reply::Hang => {
                std::thread::sleep(timeout);
                Err(DetectionError::Timeout)
            }
        }
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Published {
    Status(StatusSnapshot),
    Frame(FrameUpdate),
}

/// Publish sink that keeps everything it was handed, in order.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<Published>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn PublishSink> {
        Box::new(self.clone())
    }

    pub fn all(&self) -> Vec<Published> {
        self.log.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<StatusSnapshot> {
        self.all()
            .into_iter()
            .filter_map(|p| match p {
                Published::Status(s) => Some(s),
                Published::Frame(_) => None,
            })
            .collect()
    }

    pub fn frames(&self) -> Vec<FrameUpdate> {
        self.all()
            .into_iter()
            .filter_map(|p| match p {
                Published::Frame(f) => Some(f),
                Published::Status(_) => None,
            })
            .collect()
    }

    pub fn causes(&self) -> Vec<StatusCause> {
        self.statuses().into_iter().map(|s| s.cause).collect()
    }
}

impl PublishSink for RecordingSink {
    fn publish_status(&mut self, snapshot: &StatusSnapshot) {
        self.log.lock().unwrap().push(Published::Status(snapshot.clone()));
    }

    fn publish_frame(&mut self, update: &FrameUpdate) {
        self.log.lock().unwrap().push(Published::Frame(update.clone()));
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Hardware handles kept by the test after the ports are handed over.
pub struct Rig {
    pub smoke: Arc<SimLine>,
    pub alarm: RecordingOutput,
    pub camera: Arc<SimCameraControl>,
}

impl Rig {
    pub fn build() -> (Self, Hardware) {
        let smoke = SimLine::new(false);
        let alarm = RecordingOutput::new();
        let camera = SimCameraControl::new(Duration::from_millis(5));
        let hw = Hardware {
            smoke_line: Box::new(SimInputProvider::new(Arc::clone(&smoke))),
            alarm_line: alarm.provider(),
            camera: Box::new(SimCamera::new(Arc::clone(&camera))),
        };
        (Self { smoke, alarm, camera }, hw)
    }
}
