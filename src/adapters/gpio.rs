//! GPIO character-device lines (`/dev/gpiochipN`) through `gpiocdev`.
//!
//! | Type                 | Implements                              |
//! |----------------------|-----------------------------------------|
//! | `GpioInput`          | embedded-hal `InputPin`                 |
//! | `GpioOutput`         | embedded-hal `OutputPin`                |
//! | `GpioInputProvider`  | `InputLineProvider` (smoke contact)     |
//! | `GpioOutputProvider` | `OutputLineProvider` (sounder)          |
//!
//! Claimed lines are embedded-hal pins and reach the core through the
//! blanket `InputLine`/`OutputLine` impls.  The smoke input is requested
//! with the configured bias and edge detection; a watcher worker waits on
//! kernel edge events, keeps the pin's level current and pushes one edge
//! to the monitor's queue per event.
//!
//! ```text
//!   kernel edge ──▶ gpio-edges worker ──▶ level (atomic) ──▶ GpioInput::is_high
//!                          └──────────▶ EdgeSender::push
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use gpiocdev::Request;
use gpiocdev::line::{Bias, EdgeDetection, Value};
use log::{debug, info, warn};

use crate::app::ports::{InputLine, InputLineProvider, OutputLine, OutputLineProvider};
use crate::config::{Edge, Pull, SystemConfig};
use crate::drivers::worker::{StopToken, Worker};
use crate::error::LineError;
use crate::events::EdgeSender;

/// Consumer label shown by `gpioinfo`.
const CONSUMER: &str = "smokewatch";

/// Longest wait for a kernel edge before the level is re-read.
const WATCH_PERIOD: Duration = Duration::from_millis(100);

/// Bound on stopping the watcher when the input is released.
const WATCH_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Line assignments taken from [`SystemConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioSettings {
    pub chip: String,
    pub smoke_pin: u32,
    pub smoke_edge: Edge,
    pub smoke_pull: Pull,
    pub alarm_pin: u32,
}

impl GpioSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            chip: config.gpio_chip.clone(),
            smoke_pin: config.smoke_sensor_pin,
            smoke_edge: config.smoke_edge,
            smoke_pull: config.smoke_pull,
            alarm_pin: config.alarm_output_pin,
        }
    }
}

fn edge_detection(edge: Edge) -> EdgeDetection {
    match edge {
        Edge::Rising => EdgeDetection::RisingEdge,
        Edge::Falling => EdgeDetection::FallingEdge,
        Edge::Both => EdgeDetection::BothEdges,
    }
}

fn bias(pull: Pull) -> Bias {
    match pull {
        Pull::Disabled => Bias::Disabled,
        Pull::Up => Bias::PullUp,
        Pull::Down => Bias::PullDown,
    }
}

fn level(value: Value) -> bool {
    matches!(value, Value::Active)
}

fn request_failed(what: &str, chip: &str, offset: u32, e: &gpiocdev::Error) -> LineError {
    warn!("GPIO: {} {}:{} request failed: {}", what, chip, offset, e);
    LineError::ConfigFailed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioPinError {
    Read,
    Write,
}

impl digital::Error for GpioPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

// ── Input ─────────────────────────────────────────────────────

struct WatchState {
    level: AtomicBool,
    fault: AtomicBool,
}

/// The claimed smoke input.  Dropping it stops the watcher, which
/// releases the line.
pub struct GpioInput {
    state: Arc<WatchState>,
    watcher: Worker,
}

impl ErrorType for GpioInput {
    type Error = GpioPinError;
}

impl InputPin for GpioInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.state.fault.load(Ordering::Acquire) {
            return Err(GpioPinError::Read);
        }
        Ok(self.state.level.load(Ordering::Acquire))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

impl Drop for GpioInput {
    fn drop(&mut self) {
        let _ = self.watcher.stop(WATCH_JOIN_TIMEOUT);
    }
}

fn watch(request: &Request, offset: u32, state: &WatchState, edges: &EdgeSender, stop: &StopToken) {
    while !stop.is_requested() {
        let polled = request
            .wait_edge_event(WATCH_PERIOD)
            .and_then(|ready| if ready { request.read_edge_event().map(|_| true) } else { Ok(false) })
            .and_then(|edged| request.value(offset).map(|v| (edged, level(v))));
        match polled {
            Ok((edged, high)) => {
                state.level.store(high, Ordering::Release);
                if edged {
                    edges.push();
                }
            }
            Err(e) => {
                warn!("GPIO: line {} watch failed: {}", offset, e);
                state.fault.store(true, Ordering::Release);
                break;
            }
        }
    }
    debug!("GPIO: line {} watcher exiting", offset);
}

pub struct GpioInputProvider {
    settings: GpioSettings,
}

impl GpioInputProvider {
    pub fn new(settings: GpioSettings) -> Self {
        Self { settings }
    }
}

impl InputLineProvider for GpioInputProvider {
    fn acquire(&mut self, edges: EdgeSender) -> Result<Box<dyn InputLine>, LineError> {
        let s = &self.settings;
        let offset = s.smoke_pin;
        let request = Request::builder()
            .on_chip(s.chip.as_str())
            .with_consumer(CONSUMER)
            .with_line(offset)
            .as_input()
            .with_bias(bias(s.smoke_pull))
            .with_edge_detection(edge_detection(s.smoke_edge))
            .request()
            .map_err(|e| request_failed("smoke input", &s.chip, offset, &e))?;
        let initial = request.value(offset).map_err(|e| {
            warn!("GPIO: smoke input {} initial read failed: {}", offset, e);
            LineError::ReadFailed
        })?;

        let state = Arc::new(WatchState {
            level: AtomicBool::new(level(initial)),
            fault: AtomicBool::new(false),
        });
        let watcher = {
            let state = Arc::clone(&state);
            Worker::spawn("gpio-edges", move |stop| watch(&request, offset, &state, &edges, &stop))
                .map_err(|_| LineError::ConfigFailed)?
        };
        info!(
            "GPIO: smoke input {}:{} claimed ({:?} edges, {:?} bias)",
            s.chip, offset, s.smoke_edge, s.smoke_pull
        );
        Ok(Box::new(GpioInput { state, watcher }))
    }
}

// ── Output ────────────────────────────────────────────────────

/// The claimed alarm output, requested low.
pub struct GpioOutput {
    request: Request,
    offset: u32,
}

impl GpioOutput {
    fn write(&mut self, value: Value) -> Result<(), GpioPinError> {
        self.request.set_value(self.offset, value).map_err(|e| {
            debug!("GPIO: line {} write failed: {}", self.offset, e);
            GpioPinError::Write
        })
    }
}

impl ErrorType for GpioOutput {
    type Error = GpioPinError;
}

impl OutputPin for GpioOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(Value::Inactive)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(Value::Active)
    }
}

pub struct GpioOutputProvider {
    settings: GpioSettings,
}

impl GpioOutputProvider {
    pub fn new(settings: GpioSettings) -> Self {
        Self { settings }
    }
}

impl OutputLineProvider for GpioOutputProvider {
    fn acquire(&mut self) -> Result<Box<dyn OutputLine>, LineError> {
        let s = &self.settings;
        let offset = s.alarm_pin;
        let request = Request::builder()
            .on_chip(s.chip.as_str())
            .with_consumer(CONSUMER)
            .with_line(offset)
            .as_output(Value::Inactive)
            .request()
            .map_err(|e| request_failed("alarm output", &s.chip, offset, &e))?;
        info!("GPIO: alarm output {}:{} claimed", s.chip, offset);
        Ok(Box::new(GpioOutput { request, offset }))
    }
}
