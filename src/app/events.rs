//! Domain events and the status views handed to observers.
//!
//! Everything here is plain data.  [`AlarmState`] is produced only by the
//! [`AlarmCoordinator`](crate::fsm::coordinator::AlarmCoordinator),
//! [`CameraStatus`] only by the
//! [`CapturePipeline`](crate::vision::capture::CapturePipeline); the
//! [`StatusBroadcaster`](crate::broadcast::StatusBroadcaster) composes them
//! into a [`StatusSnapshot`] at publish time.

use serde::{Deserialize, Serialize, Serializer};

// ── Sensor / detection inputs ─────────────────────────────────

/// A debounced change of the smoke detector contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmokeEvent {
    /// Wall-clock time of the accepted transition (Unix ms).
    pub timestamp_ms: u64,
    pub detected: bool,
}

/// One region reported by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireDetection {
    /// `[x1, y1, x2, y2]` in source-frame pixels.
    pub bbox: [f32; 4],
    pub confidence: f32,
    #[serde(rename = "class")]
    pub class_id: i32,
}

impl FireDetection {
    /// Highest confidence in a batch; `None` for an empty batch.
    /// Non-finite confidences are ignored.
    pub fn max_confidence(detections: &[FireDetection]) -> Option<f32> {
        detections
            .iter()
            .map(|d| d.confidence)
            .filter(|c| c.is_finite())
            .fold(None, |best, c| match best {
                Some(b) if b >= c => Some(b),
                _ => Some(c),
            })
    }
}

// ── Alarm state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    Smoke,
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmSource {
    Sensor,
    Camera,
}

/// The most recent cause of an alarm transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlarmEvent {
    pub timestamp_ms: u64,
    pub kind: AlarmKind,
    pub source: AlarmSource,
    pub active: bool,
}

/// Read-only copy of the coordinator's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmState {
    pub enabled: bool,
    pub active: bool,
    pub last_event: Option<AlarmEvent>,
}

// ── Camera status ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraStatus {
    /// Capture loop alive and producing frames.
    pub running: bool,
    /// Detection submissions per second.
    pub target_fps: f32,
    /// `(width, height)`; `(0, 0)` when the device is closed.
    pub resolution: (u32, u32),
    /// Regions in the latest detection batch.
    pub detection_count: usize,
}

impl CameraStatus {
    /// Status of a pipeline that is not running.
    pub fn stopped(target_fps: f32) -> Self {
        Self {
            running: false,
            target_fps,
            resolution: (0, 0),
            detection_count: 0,
        }
    }
}

// ── Published views ───────────────────────────────────────────

/// Why a snapshot was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCause {
    /// The alarm coordinator accepted a command or input.
    Alarm,
    /// The capture pipeline changed state (started, stopped, degraded).
    Camera,
    /// A transport client connected and needs the current state.
    ClientConnected { client_id: u64 },
    /// Direct answer to a status query; never queued.
    Query,
}

/// Point-in-time composition of every component's state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub cause: StatusCause,
    pub alarm: AlarmState,
    pub camera: CameraStatus,
    pub detections: Vec<FireDetection>,
}

/// Latest frames plus the detections that produced the processed one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameUpdate {
    #[serde(rename = "frame")]
    pub raw_frame_b64: Option<String>,
    #[serde(rename = "processed_frame")]
    pub processed_frame_b64: Option<String>,
    pub detections: Vec<FireDetection>,
}

// ── Wire format ───────────────────────────────────────────────
//
// Observers expect the flat shape below; the internal types stay nested.
//
//   { enabled, active,
//     last_event: { timestamp, type, source, active },
//     camera: { running, fps, resolution: { width, height }, detections_count },
//     detections: [...] }

#[derive(Serialize)]
struct WireStatus<'a> {
    enabled: bool,
    active: bool,
    last_event: WireLastEvent,
    camera: WireCamera,
    detections: &'a [FireDetection],
}

#[derive(Serialize)]
struct WireLastEvent {
    timestamp: Option<u64>,
    #[serde(rename = "type")]
    kind: Option<AlarmKind>,
    source: Option<AlarmSource>,
    active: Option<bool>,
}

#[derive(Serialize)]
struct WireCamera {
    running: bool,
    fps: f32,
    resolution: WireResolution,
    detections_count: usize,
}

#[derive(Serialize)]
struct WireResolution {
    width: u32,
    height: u32,
}

impl Serialize for StatusSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ev = self.alarm.last_event;
        WireStatus {
            enabled: self.alarm.enabled,
            active: self.alarm.active,
            last_event: WireLastEvent {
                timestamp: ev.map(|e| e.timestamp_ms),
                kind: ev.map(|e| e.kind),
                source: ev.map(|e| e.source),
                active: ev.map(|e| e.active),
            },
            camera: WireCamera {
                running: self.camera.running,
                fps: self.camera.target_fps,
                resolution: WireResolution {
                    width: self.camera.resolution.0,
                    height: self.camera.resolution.1,
                },
                detections_count: self.camera.detection_count,
            },
            detections: &self.detections,
        }
        .serialize(serializer)
    }
}
