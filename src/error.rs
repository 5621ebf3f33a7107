//! Unified error types for the SmokeWatch core.
//!
//! Each subsystem has its own small error enum; all of them convert into
//! the top-level [`Error`] so lifecycle calls on the
//! [`Appliance`](crate::app::service::Appliance) can be handled uniformly.
//! Background loops never return these, they log them and carry on.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible lifecycle operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A GPIO line could not be claimed, read or written.
    Line(LineError),
    /// The alarm output could not be driven.
    Actuator(ActuatorError),
    /// The camera could not be opened or read.
    Capture(CaptureError),
    /// The detection service request failed.
    Detection(DetectionError),
    /// A background task did not exit in time.
    Worker(WorkerError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(e) => write!(f, "line: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Capture(e) => write!(f, "capture: {e}"),
            Self::Detection(e) => write!(f, "detection: {e}"),
            Self::Worker(e) => write!(f, "worker: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// GPIO line errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Another process (or a stale handle of ours) holds the line.
    Busy,
    /// The process lacks access to the GPIO character device.
    PermissionDenied,
    /// Driver returned an error while configuring the line.
    ConfigFailed,
    /// Reading the line level failed.
    ReadFailed,
    /// Writing the line level failed.
    WriteFailed,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "line busy"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::ConfigFailed => write!(f, "line config failed"),
            Self::ReadFailed => write!(f, "line read failed"),
            Self::WriteFailed => write!(f, "line write failed"),
        }
    }
}

impl std::error::Error for LineError {}

impl From<LineError> for Error {
    fn from(e: LineError) -> Self {
        Self::Line(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The output line could not be claimed.
    InitFailed(LineError),
    /// The write failed, and so did the write after re-initialising.
    WriteFailed(LineError),
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(e) => write!(f, "init failed ({e})"),
            Self::WriteFailed(e) => write!(f, "write failed after re-init ({e})"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Capture errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The camera device could not be opened.
    OpenFailed(String),
    /// A frame read failed (the loop retries these).
    ReadFailed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed(why) => write!(f, "could not open camera: {why}"),
            Self::ReadFailed => write!(f, "frame read failed"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Self::Capture(e)
    }
}

// ---------------------------------------------------------------------------
// Detection service errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// No response within the request timeout.
    Timeout,
    /// Connection refused, DNS failure, reset, ...
    Transport(String),
    /// Service answered with a non-200 status.
    Status(u16),
    /// Response body was not the expected JSON shape.
    Malformed(String),
    /// `processed_frame` was not valid base64.
    Decode,
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Transport(why) => write!(f, "transport error: {why}"),
            Self::Status(code) => write!(f, "service returned status {code}"),
            Self::Malformed(why) => write!(f, "malformed response: {why}"),
            Self::Decode => write!(f, "processed frame is not valid base64"),
        }
    }
}

impl std::error::Error for DetectionError {}

impl From<DetectionError> for Error {
    fn from(e: DetectionError) -> Self {
        Self::Detection(e)
    }
}

// ---------------------------------------------------------------------------
// Worker errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    /// The OS refused to spawn the thread.
    SpawnFailed(&'static str),
    /// The task did not exit within the join bound.
    JoinTimeout(&'static str),
    /// The task panicked.
    Panicked(&'static str),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(name) => write!(f, "could not spawn '{name}'"),
            Self::JoinTimeout(name) => write!(f, "'{name}' did not stop in time"),
            Self::Panicked(name) => write!(f, "'{name}' panicked"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<WorkerError> for Error {
    fn from(e: WorkerError) -> Self {
        Self::Worker(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from [`ConfigPort`](crate::app::ports::ConfigPort) operations
/// and [`SystemConfig::validate`](crate::config::SystemConfig::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted(String),
    /// A config field failed range validation.
    /// The `&'static str` names the field and the rule.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted(why) => write!(f, "config corrupted: {why}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Io(why) => write!(f, "I/O error: {why}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
