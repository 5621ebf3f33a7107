//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ components (domain)
//! ```
//!
//! Driven adapters (GPIO lines, camera, detection service, publish sink,
//! config storage) implement these traits.  Components consume them as
//! boxed trait objects or generics, so the core never touches hardware or
//! the network directly and the host tests swap in scripted mocks.
//!
//! ## Threading
//!
//! Every port that a background task owns is `Send`.  Observer ports are
//! `Send + Sync` because the task that calls them is not the one that owns
//! them.  Implementations must not call back into the component that
//! invoked them.

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use log::debug;

use super::events::{AlarmState, CameraStatus, FireDetection, FrameUpdate, SmokeEvent, StatusSnapshot};
use crate::config::SystemConfig;
use crate::error::{CaptureError, ConfigError, DetectionError, LineError};
use crate::events::EdgeSender;
use crate::vision::detection::{DetectRequest, DetectResponse};

// ───────────────────────────────────────────────────────────────
// Hardware lines (driven adapter: GPIO ↔ domain)
// ───────────────────────────────────────────────────────────────

/// A claimed digital input.
pub trait InputLine: Send {
    /// Current logic level (`true` = high).
    fn read_level(&mut self) -> Result<bool, LineError>;
}

/// A claimed digital output.
pub trait OutputLine: Send {
    fn drive(&mut self, high: bool) -> Result<(), LineError>;
}

// Any embedded-hal pin is a line.  Board crates and the simulated pins in
// `adapters::sim` plug in through these impls.

impl<P> InputLine for P
where
    P: InputPin + Send,
{
    fn read_level(&mut self) -> Result<bool, LineError> {
        self.is_high().map_err(|e| {
            debug!("input pin error: {:?}", e);
            LineError::ReadFailed
        })
    }
}

impl<P> OutputLine for P
where
    P: OutputPin + Send,
{
    fn drive(&mut self, high: bool) -> Result<(), LineError> {
        let res = if high { self.set_high() } else { self.set_low() };
        res.map_err(|e| {
            debug!("output pin error: {:?}", e);
            LineError::WriteFailed
        })
    }
}

/// Claims the smoke input line.  Called again after every line fault.
pub trait InputLineProvider: Send {
    /// Claim and configure the line.  In interrupt mode the driver calls
    /// [`EdgeSender::push`] from its interrupt context on every configured
    /// edge; it must do nothing else there.
    fn acquire(&mut self, edges: EdgeSender) -> Result<Box<dyn InputLine>, LineError>;
}

/// Claims the alarm output line.  Called again after a write fault.
pub trait OutputLineProvider: Send {
    fn acquire(&mut self) -> Result<Box<dyn OutputLine>, LineError>;
}

// ───────────────────────────────────────────────────────────────
// Camera (driven adapter: V4L2 / sim → domain)
// ───────────────────────────────────────────────────────────────

/// A frame source producing JPEG-encoded frames.
pub trait CameraDevice: Send + 'static {
    /// Open at the requested resolution.  Returns the resolution actually
    /// granted by the device.
    fn open(&mut self, width: u32, height: u32) -> Result<(u32, u32), CaptureError>;

    /// Grab one frame.  `Err(ReadFailed)` when the device yields nothing.
    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Release the device.  Safe to call when not open.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Detection (driven adapter: domain → HTTP service)
// ───────────────────────────────────────────────────────────────

/// Carries one detection request to the external service.
pub trait DetectorTransport: Send + 'static {
    /// Send `request` and parse a 200 response.  Must give up after
    /// `timeout` with [`DetectionError::Timeout`].
    fn submit(&self, request: &DetectRequest<'_>, timeout: Duration) -> Result<DetectResponse, DetectionError>;
}

/// Result of analysing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub detections: Vec<FireDetection>,
    /// Annotated JPEG returned by the service, if any.
    pub processed_jpeg: Option<Vec<u8>>,
}

/// What the capture pipeline's detection task calls for each submitted frame.
pub trait FrameAnalyzer: Send + 'static {
    fn analyze(&mut self, jpeg: &[u8]) -> Result<Analysis, DetectionError>;
}

// ───────────────────────────────────────────────────────────────
// Observers (domain → domain, across tasks)
// ───────────────────────────────────────────────────────────────

/// Receives debounced smoke transitions from the sensor monitor task.
pub trait SmokeObserver: Send + Sync + 'static {
    fn on_smoke(&self, event: SmokeEvent);
}

/// Receives the max confidence of each successful detection batch.
pub trait FireObserver: Send + Sync + 'static {
    fn on_fire(&self, confidence: f32);
}

impl<T: SmokeObserver + ?Sized> SmokeObserver for std::sync::Arc<T> {
    fn on_smoke(&self, event: SmokeEvent) {
        (**self).on_smoke(event);
    }
}

impl<T: FireObserver + ?Sized> FireObserver for std::sync::Arc<T> {
    fn on_fire(&self, confidence: f32) {
        (**self).on_fire(confidence);
    }
}

/// Read side the broadcaster composes snapshots from.
pub trait StatusSource: Send + Sync + 'static {
    fn alarm_state(&self) -> AlarmState;
    fn camera_status(&self) -> CameraStatus;
    fn detections(&self) -> Vec<FireDetection>;
}

// ───────────────────────────────────────────────────────────────
// Publish sink (driven adapter: domain → transport layer)
// ───────────────────────────────────────────────────────────────

/// Implemented by the transport layer that fans out to clients.  Called
/// only from the broadcaster's consumer task, one call at a time.
pub trait PublishSink: Send + 'static {
    fn publish_status(&mut self, snapshot: &StatusSnapshot);
    fn publish_frame(&mut self, update: &FrameUpdate);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}
