//! The appliance assembly: one instance of every component.
//!
//! [`Appliance`] wires the components together explicitly; nothing in the
//! crate is a global.  All I/O flows through port traits handed in at
//! construction, making the whole appliance testable with mock adapters.
//!
//! ```text
//!  InputLineProvider ──▶ SensorMonitor ──▶ ┌──────────────────┐ ──▶ ActuatorController ──▶ OutputLineProvider
//!                                          │ AlarmCoordinator │
//!  CameraDevice ──▶ CapturePipeline ──┐    └──────────────────┘
//!                      │              │           ▲  │ notify
//!                      │         DetectionClient ─┘  ▼
//!                      └── frame updates ──▶ StatusBroadcaster ──▶ PublishSink
//! ```
//!
//! ## Lifecycle
//!
//! `start` brings up capture first (the only fatal failure), then the
//! broadcaster consumer, then the smoke monitor.  `shutdown` runs capture
//! → sensor → alarm → broadcaster, so every notification produced while
//! stopping is still published before the consumer exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};

use crate::broadcast::{BroadcastSettings, StatusBroadcaster, StatusSender};
use crate::config::SystemConfig;
use crate::drivers::actuator::ActuatorController;
use crate::error::Error;
use crate::fsm::coordinator::{AlarmCoordinator, AlarmSettings};
use crate::sensors::smoke::{SensorMonitor, SensorSettings};
use crate::vision::capture::{CapturePipeline, CaptureSettings, CaptureState};
use crate::vision::detection::{DetectionClient, DetectionSettings};

use super::commands::{AppCommand, CommandReply};
use super::events::{AlarmState, CameraStatus, FireDetection, StatusCause, StatusSnapshot};
use super::ports::{CameraDevice, DetectorTransport, InputLineProvider, OutputLineProvider, PublishSink, StatusSource};

/// Hardware ports for one appliance.
pub struct Hardware {
    pub smoke_line: Box<dyn InputLineProvider>,
    pub alarm_line: Box<dyn OutputLineProvider>,
    pub camera: Box<dyn CameraDevice>,
}

// ───────────────────────────────────────────────────────────────
// Status source
// ───────────────────────────────────────────────────────────────

/// Read view over the alarm and capture state for the broadcaster.
pub struct ApplianceStatus {
    alarm: Arc<AlarmCoordinator>,
    capture: Arc<CaptureState>,
}

impl StatusSource for ApplianceStatus {
    fn alarm_state(&self) -> AlarmState {
        self.alarm.status()
    }

    fn camera_status(&self) -> CameraStatus {
        self.capture.camera_status()
    }

    fn detections(&self) -> Vec<FireDetection> {
        self.capture.detections()
    }
}

// ───────────────────────────────────────────────────────────────
// Appliance
// ───────────────────────────────────────────────────────────────

pub struct Appliance {
    config: SystemConfig,
    broadcaster: StatusBroadcaster,
    sender: StatusSender,
    actuator: Arc<ActuatorController>,
    alarm: Arc<AlarmCoordinator>,
    sensor: SensorMonitor,
    capture: CapturePipeline,
    shut_down: AtomicBool,
}

impl Appliance {
    /// Build every component from `config`.  Nothing runs until [`start`](Self::start).
    pub fn new<T: DetectorTransport>(config: SystemConfig, hw: Hardware, detector: T) -> Self {
        let broadcaster = StatusBroadcaster::new(BroadcastSettings::from_config(&config));
        let sender = broadcaster.sender();

        let actuator = Arc::new(ActuatorController::new(hw.alarm_line));
        let alarm = Arc::new(AlarmCoordinator::new(
            AlarmSettings::from_config(&config),
            Arc::clone(&actuator),
            sender.clone(),
        ));

        let sensor = SensorMonitor::new(SensorSettings::from_config(&config), hw.smoke_line);

        let client = DetectionClient::new(detector, alarm.clone(), DetectionSettings::from_config(&config));
        let capture = CapturePipeline::new(
            CaptureSettings::from_config(&config),
            hw.camera,
            Box::new(client),
            sender.clone(),
        );

        Self {
            config,
            broadcaster,
            sender,
            actuator,
            alarm,
            sensor,
            capture,
            shut_down: AtomicBool::new(false),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start every component.  Only a camera that cannot be opened is
    /// fatal; in that case nothing is left running.
    pub fn start(&self, sink: Box<dyn PublishSink>) -> Result<(), Error> {
        if let Err(e) = self.actuator.init() {
            // Not fatal: every write re-attempts acquisition.
            warn!("APP: alarm output unavailable at startup: {}", e);
        }

        self.capture.start()?;

        let source = Arc::new(ApplianceStatus {
            alarm: Arc::clone(&self.alarm),
            capture: self.capture.state(),
        });
        if let Err(e) = self.broadcaster.start(source, sink) {
            let _ = self.capture.stop();
            return Err(e.into());
        }
        if let Err(e) = self.sensor.start(self.alarm.clone()) {
            let _ = self.capture.stop();
            let _ = self.broadcaster.shutdown();
            return Err(e.into());
        }

        info!(
            "APP: started ({:?} lines, smoke pin {}, alarm pin {}, detector {})",
            self.config.line_driver,
            self.config.smoke_sensor_pin,
            self.config.alarm_output_pin,
            self.config.detector_url
        );
        Ok(())
    }

    /// Stop everything in dependency order.  Every step runs even if an
    /// earlier one failed; the first error is returned.  Idempotent.
    pub fn shutdown(&self) -> Result<(), Error> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("APP: shutting down");
        let mut first: Option<Error> = None;
        let mut keep = |res: Result<(), Error>, what: &str| {
            if let Err(e) = res {
                error!("APP: {} shutdown: {}", what, e);
                first.get_or_insert(e);
            }
        };

        keep(self.capture.stop().map_err(Error::from), "capture");
        keep(self.sensor.stop().map_err(Error::from), "sensor");
        self.alarm.stop();
        self.actuator.release();
        keep(self.broadcaster.shutdown().map_err(Error::from), "broadcaster");

        match first {
            Some(e) => Err(e),
            None => {
                info!("APP: shutdown complete");
                Ok(())
            }
        }
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn handle_command(&self, cmd: AppCommand) -> CommandReply {
        info!("APP: command {:?}", cmd);
        match cmd {
            AppCommand::SetEnabled(enabled) => {
                self.alarm.set_enabled(enabled);
                CommandReply::Ack
            }
            AppCommand::ControlAlarm(true) => {
                self.alarm.activate();
                CommandReply::Ack
            }
            AppCommand::ControlAlarm(false) => {
                self.alarm.deactivate();
                CommandReply::Ack
            }
            AppCommand::GetFrame => CommandReply::Frame(self.capture.get_frame()),
            AppCommand::GetStatus => CommandReply::Status(self.snapshot(StatusCause::Query)),
            AppCommand::ClientConnected { client_id } => {
                self.sender.notify(StatusCause::ClientConnected { client_id });
                CommandReply::Ack
            }
        }
    }

    /// Compose a snapshot now, bypassing the queue.
    pub fn snapshot(&self, cause: StatusCause) -> StatusSnapshot {
        StatusSnapshot {
            cause,
            alarm: self.alarm.status(),
            camera: self.capture.camera_status(),
            detections: self.capture.detections(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn alarm(&self) -> &Arc<AlarmCoordinator> {
        &self.alarm
    }

    pub fn actuator(&self) -> &Arc<ActuatorController> {
        &self.actuator
    }

    pub fn sensor(&self) -> &SensorMonitor {
        &self.sensor
    }

    pub fn capture(&self) -> &CapturePipeline {
        &self.capture
    }

    pub fn sender(&self) -> StatusSender {
        self.sender.clone()
    }
}

impl Drop for Appliance {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
