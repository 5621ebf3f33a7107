//! Simulated hardware for hosts without GPIO or a camera.
//!
//! | Type                | Implements                         |
//! |---------------------|------------------------------------|
//! | `SimPin`            | embedded-hal `InputPin`/`OutputPin` |
//! | `SimInputProvider`  | `InputLineProvider`                |
//! | `SimOutputProvider` | `OutputLineProvider`               |
//! | `SimCamera`         | `CameraDevice`                     |
//!
//! Each simulated device is steered through a shared handle ([`SimLine`],
//! [`SimCameraControl`]) that the host binary or a test keeps: flip the
//! smoke contact, inject acquisition/read/write faults, count pulses.
//! Flipping an input line while it is claimed pushes an edge exactly like
//! a GPIO interrupt would.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use log::debug;

use crate::app::ports::{CameraDevice, InputLine, InputLineProvider, OutputLine, OutputLineProvider};
use crate::drivers::worker::lock;
use crate::error::{CaptureError, LineError};
use crate::events::EdgeSender;

// ── Lines ─────────────────────────────────────────────────────

/// Shared state of one simulated GPIO line.
#[derive(Default)]
pub struct SimLine {
    level: AtomicBool,
    edges: Mutex<Option<EdgeSender>>,
    acquire_failures: AtomicU32,
    write_failures: AtomicU32,
    read_fault: AtomicBool,
    acquires: AtomicU32,
    rising_edges: AtomicU32,
}

impl SimLine {
    pub fn new(initial: bool) -> Arc<Self> {
        let line = Self::default();
        line.level.store(initial, Ordering::SeqCst);
        Arc::new(line)
    }

    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Drive the line from outside (the smoke detector relay).  Pushes an
    /// edge to the claiming driver if the level changed.
    pub fn set_level(&self, high: bool) {
        if self.level.swap(high, Ordering::SeqCst) != high {
            if let Some(tx) = lock(&self.edges).as_ref() {
                tx.push();
            }
        }
    }

    /// The next `n` acquisitions fail with [`LineError::Busy`].
    pub fn fail_next_acquires(&self, n: u32) {
        self.acquire_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.write_failures.store(n, Ordering::SeqCst);
    }

    /// While set, every read fails.
    pub fn set_read_fault(&self, fault: bool) {
        self.read_fault.store(fault, Ordering::SeqCst);
    }

    /// Successful acquisitions so far.
    pub fn acquires(&self) -> u32 {
        self.acquires.load(Ordering::SeqCst)
    }

    /// Low→high transitions written by the driver.
    pub fn rising_edges(&self) -> u32 {
        self.rising_edges.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn claim(&self) -> Result<(), LineError> {
        if Self::take_failure(&self.acquire_failures) {
            return Err(LineError::Busy);
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A claimed simulated pin.
pub struct SimPin {
    line: Arc<SimLine>,
}

impl ErrorType for SimPin {
    type Error = SimPinError;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.line.read_fault.load(Ordering::SeqCst) {
            return Err(SimPinError);
        }
        Ok(self.line.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl SimPin {
    fn write(&mut self, high: bool) -> Result<(), SimPinError> {
        if SimLine::take_failure(&self.line.write_failures) {
            return Err(SimPinError);
        }
        let was = self.line.level.swap(high, Ordering::SeqCst);
        if high && !was {
            self.line.rising_edges.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for SimPin {
    fn drop(&mut self) {
        lock(&self.line.edges).take();
    }
}

pub struct SimInputProvider {
    line: Arc<SimLine>,
}

impl SimInputProvider {
    pub fn new(line: Arc<SimLine>) -> Self {
        Self { line }
    }
}

impl InputLineProvider for SimInputProvider {
    fn acquire(&mut self, edges: EdgeSender) -> Result<Box<dyn InputLine>, LineError> {
        self.line.claim()?;
        *lock(&self.line.edges) = Some(edges);
        debug!("SIM: input line claimed");
        Ok(Box::new(SimPin {
            line: Arc::clone(&self.line),
        }))
    }
}

pub struct SimOutputProvider {
    line: Arc<SimLine>,
}

impl SimOutputProvider {
    pub fn new(line: Arc<SimLine>) -> Self {
        Self { line }
    }
}

impl OutputLineProvider for SimOutputProvider {
    fn acquire(&mut self) -> Result<Box<dyn OutputLine>, LineError> {
        self.line.claim()?;
        debug!("SIM: output line claimed");
        Ok(Box::new(SimPin {
            line: Arc::clone(&self.line),
        }))
    }
}

// ── Camera ────────────────────────────────────────────────────

/// Steering handle for a [`SimCamera`].
#[derive(Default)]
pub struct SimCameraControl {
    open_fails: AtomicBool,
    broken: AtomicBool,
    read_failures: AtomicU32,
    frame_period_ms: AtomicU64,
    reads: AtomicU64,
    opens: AtomicU32,
}

impl SimCameraControl {
    pub fn new(frame_period: Duration) -> Arc<Self> {
        let c = Self::default();
        c.frame_period_ms
            .store(frame_period.as_millis() as u64, Ordering::SeqCst);
        Arc::new(c)
    }

    pub fn set_open_fails(&self, fails: bool) {
        self.open_fails.store(fails, Ordering::SeqCst);
    }

    /// While set, every read fails.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Frames delivered so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful opens so far.
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

/// Produces small JPEG-framed byte strings at a fixed rate.
pub struct SimCamera {
    control: Arc<SimCameraControl>,
    open: bool,
    seq: u32,
}

impl SimCamera {
    pub fn new(control: Arc<SimCameraControl>) -> Self {
        Self {
            control,
            open: false,
            seq: 0,
        }
    }
}

impl CameraDevice for SimCamera {
    fn open(&mut self, width: u32, height: u32) -> Result<(u32, u32), CaptureError> {
        if self.control.open_fails.load(Ordering::SeqCst) {
            return Err(CaptureError::OpenFailed("simulated device missing".into()));
        }
        self.open = true;
        self.control.opens.fetch_add(1, Ordering::SeqCst);
        Ok((width, height))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.open {
            return Err(CaptureError::ReadFailed);
        }
        std::thread::sleep(Duration::from_millis(
            self.control.frame_period_ms.load(Ordering::SeqCst),
        ));
        if self.control.broken.load(Ordering::SeqCst)
            || SimLine::take_failure(&self.control.read_failures)
        {
            return Err(CaptureError::ReadFailed);
        }
        self.seq = self.seq.wrapping_add(1);
        self.control.reads.fetch_add(1, Ordering::SeqCst);

        // SOI, sequence number, EOI.
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&self.seq.to_be_bytes());
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        Ok(jpeg)
    }

    fn release(&mut self) {
        self.open = false;
    }
}
