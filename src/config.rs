//! System configuration parameters
//!
//! All tunable parameters for the SmokeWatch appliance.  Values are loaded
//! through a [`ConfigPort`](crate::app::ports::ConfigPort) (JSON file on the
//! reference image); missing fields fall back to [`SystemConfig::default`].
//!
//! Two behaviours differ between historical deployments of the appliance
//! and are therefore explicit here instead of hard-coded:
//!
//! | Field             | Default        | Alternative               |
//! |-------------------|----------------|---------------------------|
//! | `smoke_read_mode` | `Interrupt`    | `Polling`                 |
//! | `smoke_policy`    | `Standalone`   | `RequireCorroboration`    |
//! | `line_driver`     | `Cdev`         | `Simulated`               |

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pins;

/// How the smoke input line is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeReadMode {
    /// Edge notifications from the line driver; a slow heartbeat re-read
    /// catches edges the driver dropped.
    Interrupt,
    /// Periodic level reads at `smoke_poll_interval_ms`.
    Polling,
}

/// Whether a smoke transition alone may raise the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokePolicy {
    /// Smoke alone activates; a recent high-confidence fire detection only
    /// marks the activation as corroborated.
    Standalone,
    /// Smoke activates only when a high-confidence fire detection was seen
    /// within `fire_corroboration_window_ms`.
    RequireCorroboration,
}

/// Which adapter claims the smoke and alarm lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDriver {
    /// GPIO character device (`gpio_chip`).
    Cdev,
    /// In-process simulated lines steered from the console.
    Simulated,
}

/// Edge(s) the line driver should report in interrupt mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Input bias requested from the line driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    Disabled,
    Up,
    Down,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Lines ---
    /// Driver for the smoke and alarm lines
    pub line_driver: LineDriver,
    /// GPIO character device holding both lines
    pub gpio_chip: String,

    // --- Smoke sensor ---
    /// BCM line of the smoke detector contact
    pub smoke_sensor_pin: u32,
    /// Edge(s) reported in interrupt mode
    pub smoke_edge: Edge,
    /// Bias on the smoke input
    pub smoke_pull: Pull,
    /// Interrupt-driven or polled observation
    pub smoke_read_mode: SmokeReadMode,
    /// Poll interval in polling mode (milliseconds, at most 100)
    pub smoke_poll_interval_ms: u32,
    /// Debounce window (milliseconds, at least 300)
    pub smoke_debounce_ms: u32,
    /// Backoff between line acquisition attempts (milliseconds)
    pub line_retry_backoff_ms: u32,

    // --- Alarm ---
    /// BCM line of the alarm sounder
    pub alarm_output_pin: u32,
    /// Minimum fire confidence that raises the alarm (inclusive)
    pub fire_confidence_threshold: f32,
    /// How long a high-confidence detection counts as "recent" (milliseconds)
    pub fire_corroboration_window_ms: u32,
    /// Smoke-alone vs corroborated activation
    pub smoke_policy: SmokePolicy,
    /// Half period of the alarm pulse (milliseconds on, then off)
    pub pulse_half_period_ms: u32,

    // --- Camera ---
    /// Requested capture width (pixels)
    pub frame_width: u32,
    /// Requested capture height (pixels)
    pub frame_height: u32,
    /// Minimum spacing between detection submissions (milliseconds)
    pub detection_interval_ms: u32,
    /// Pause between successful frame reads (milliseconds)
    pub frame_pause_ms: u32,
    /// Pause after a failed frame read (milliseconds)
    pub read_failure_backoff_ms: u32,
    /// Consecutive read failures before the device is reopened
    pub reopen_after_failures: u32,

    // --- Detection service ---
    /// Endpoint accepting `{"image": <base64 JPEG>}`
    pub detector_url: String,
    /// Request timeout (milliseconds)
    pub detection_timeout_ms: u32,

    // --- Lifecycle ---
    /// Bound on joining a background task at shutdown (milliseconds)
    pub join_timeout_ms: u32,
    /// How long a status producer blocks on a full queue before a stall
    /// warning is logged (milliseconds).  It keeps waiting afterwards.
    pub backpressure_warn_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Lines
            line_driver: LineDriver::Cdev,
            gpio_chip: "/dev/gpiochip0".to_string(),

            // Smoke sensor
            smoke_sensor_pin: pins::SMOKE_SENSOR_BCM,
            smoke_edge: Edge::Both,
            smoke_pull: Pull::Disabled,
            smoke_read_mode: SmokeReadMode::Interrupt,
            smoke_poll_interval_ms: 50,
            smoke_debounce_ms: 300,
            line_retry_backoff_ms: 5000,

            // Alarm
            alarm_output_pin: pins::ALARM_OUTPUT_BCM,
            fire_confidence_threshold: 0.7,
            fire_corroboration_window_ms: 10_000,
            smoke_policy: SmokePolicy::Standalone,
            pulse_half_period_ms: 500,

            // Camera
            frame_width: 640,
            frame_height: 480,
            detection_interval_ms: 1000, // 1 Hz
            frame_pause_ms: 10,
            read_failure_backoff_ms: 1000,
            reopen_after_failures: 10,

            // Detection service
            detector_url: "http://192.168.1.10:5001/detect".to_string(),
            detection_timeout_ms: 5000,

            // Lifecycle
            join_timeout_ms: 2000,
            backpressure_warn_ms: 10_000,
        }
    }
}

impl SystemConfig {
    /// Reject values that would make the appliance unsafe or hang.
    /// Values are never clamped: a bad config is refused as a whole.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_driver == LineDriver::Cdev && !self.gpio_chip.starts_with("/dev/") {
            return Err(ConfigError::ValidationFailed(
                "gpio_chip must be a /dev path",
            ));
        }
        if self.smoke_sensor_pin == self.alarm_output_pin {
            return Err(ConfigError::ValidationFailed(
                "smoke_sensor_pin and alarm_output_pin must differ",
            ));
        }
        if self.smoke_poll_interval_ms == 0 || self.smoke_poll_interval_ms > 100 {
            return Err(ConfigError::ValidationFailed(
                "smoke_poll_interval_ms must be in 1..=100",
            ));
        }
        if self.smoke_debounce_ms < 300 {
            return Err(ConfigError::ValidationFailed(
                "smoke_debounce_ms must be at least 300",
            ));
        }
        if self.line_retry_backoff_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "line_retry_backoff_ms must be non-zero",
            ));
        }
        if !(self.fire_confidence_threshold > 0.0 && self.fire_confidence_threshold <= 1.0) {
            return Err(ConfigError::ValidationFailed(
                "fire_confidence_threshold must be in (0, 1]",
            ));
        }
        if self.pulse_half_period_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "pulse_half_period_ms must be non-zero",
            ));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::ValidationFailed(
                "frame_width and frame_height must be non-zero",
            ));
        }
        if self.detection_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "detection_interval_ms must be non-zero",
            ));
        }
        if self.reopen_after_failures == 0 {
            return Err(ConfigError::ValidationFailed(
                "reopen_after_failures must be non-zero",
            ));
        }
        if self.detection_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "detection_timeout_ms must be non-zero",
            ));
        }
        if !self.detector_url.starts_with("http://") && !self.detector_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationFailed(
                "detector_url must be an http(s) URL",
            ));
        }
        if self.join_timeout_ms < self.pulse_half_period_ms {
            return Err(ConfigError::ValidationFailed(
                "join_timeout_ms must cover at least one pulse half period",
            ));
        }
        if self.backpressure_warn_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "backpressure_warn_ms must be non-zero",
            ));
        }
        Ok(())
    }

    /// Frames per second at which detection is requested.
    pub fn target_fps(&self) -> f32 {
        1000.0 / self.detection_interval_ms as f32
    }
}
