//! Alarm sounder / strobe output (one digital line, active high).
//!
//! ## Write contract
//!
//! [`ActuatorController::set`] is safe from any thread; concurrent calls
//! serialize on an internal mutex and the last one wins.  A failed write
//! gets exactly one recovery attempt: the line is released, re-acquired
//! from the provider, and the write is retried.  If that also fails the
//! error is logged and returned, and [`commanded`](ActuatorController::commanded)
//! keeps the previous value.
//!
//! This driver is a dumb actuator.  Pulsing and enable/disable policy live
//! in the alarm coordinator.

use std::sync::Mutex;

use log::{error, info, warn};

use crate::app::ports::{OutputLine, OutputLineProvider};
use crate::drivers::worker::lock;
use crate::error::{ActuatorError, LineError};

struct Inner {
    provider: Box<dyn OutputLineProvider>,
    line: Option<Box<dyn OutputLine>>,
    commanded: bool,
}

pub struct ActuatorController {
    inner: Mutex<Inner>,
}

impl ActuatorController {
    pub fn new(provider: Box<dyn OutputLineProvider>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                provider,
                line: None,
                commanded: false,
            }),
        }
    }

    /// Claim the line and drive it low.  Idempotent.
    pub fn init(&self) -> Result<(), ActuatorError> {
        let mut inner = lock(&self.inner);
        if inner.line.is_some() {
            return Ok(());
        }
        let mut line = inner.provider.acquire().map_err(|e| {
            error!("ALARM: output line init failed: {}", e);
            ActuatorError::InitFailed(e)
        })?;
        line.drive(false).map_err(|e| {
            error!("ALARM: output line init write failed: {}", e);
            ActuatorError::InitFailed(e)
        })?;
        inner.line = Some(line);
        inner.commanded = false;
        info!("ALARM: output line ready");
        Ok(())
    }

    /// Drive the output.  Non-fatal on failure; see the module docs.
    pub fn set(&self, active: bool) -> Result<(), ActuatorError> {
        let mut inner = lock(&self.inner);

        if let Some(line) = inner.line.as_mut() {
            match line.drive(active) {
                Ok(()) => {
                    inner.commanded = active;
                    return Ok(());
                }
                Err(e) => warn!("ALARM: output write failed ({}), re-initialising", e),
            }
        }

        inner.line = None;
        match Self::reacquire_and_drive(&mut inner, active) {
            Ok(()) => {
                inner.commanded = active;
                info!("ALARM: output line recovered");
                Ok(())
            }
            Err(e) => {
                error!(
                    "ALARM: output write failed after re-init ({}), output stays {}",
                    e,
                    if inner.commanded { "on" } else { "off" }
                );
                Err(ActuatorError::WriteFailed(e))
            }
        }
    }

    fn reacquire_and_drive(inner: &mut Inner, active: bool) -> Result<(), LineError> {
        let mut line = inner.provider.acquire()?;
        let res = line.drive(active);
        inner.line = Some(line);
        res
    }

    /// Last state successfully written to the line.
    pub fn commanded(&self) -> bool {
        lock(&self.inner).commanded
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.inner).line.is_some()
    }

    /// Drive low (best effort) and give the line back.
    pub fn release(&self) {
        let mut inner = lock(&self.inner);
        if let Some(mut line) = inner.line.take() {
            if let Err(e) = line.drive(false) {
                warn!("ALARM: could not drive output low on release: {}", e);
            }
            inner.commanded = false;
            info!("ALARM: output line released");
        }
    }
}
