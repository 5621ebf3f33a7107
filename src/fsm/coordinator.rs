//! Alarm coordinator: owns [`AlarmState`] and the pulse task.
//!
//! Every mutating call runs [`decide`](super::decide) under the state lock,
//! applies the action, releases the lock and only then sends exactly one
//! status notification.  Ignored calls (disabled, below threshold) send
//! nothing.
//!
//! ## Pulse task
//!
//! ```text
//!   set(true) ── sleep ½T ── set(false) ── sleep ½T ──┐
//!       ▲                                               │
//!       └───────────────────────────────────────────────┘
//!   on stop: set(false), exit
//! ```
//!
//! The pulse task only touches the actuator, never the coordinator lock,
//! so joining it while holding the lock cannot deadlock.  Deactivation
//! joins the task and then forces the output off, so no pulse lands after
//! `deactivate()` returns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::{Action, AlarmInput, AlarmPhase, decide};
use crate::adapters::time::{MonotonicClock, unix_millis};
use crate::app::events::{AlarmEvent, AlarmKind, AlarmSource, AlarmState, SmokeEvent, StatusCause};
use crate::app::ports::{FireObserver, SmokeObserver};
use crate::broadcast::StatusSender;
use crate::config::{SmokePolicy, SystemConfig};
use crate::drivers::actuator::ActuatorController;
use crate::drivers::worker::{StopToken, Worker, lock};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmSettings {
    /// Inclusive fire-confidence threshold.
    pub fire_threshold: f32,
    pub corroboration_window: Duration,
    pub policy: SmokePolicy,
    pub pulse_half_period: Duration,
    pub join_timeout: Duration,
}

impl AlarmSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            fire_threshold: config.fire_confidence_threshold,
            corroboration_window: Duration::from_millis(config.fire_corroboration_window_ms.into()),
            policy: config.smoke_policy,
            pulse_half_period: Duration::from_millis(config.pulse_half_period_ms.into()),
            join_timeout: Duration::from_millis(config.join_timeout_ms.into()),
        }
    }
}

struct Inner {
    enabled: bool,
    active: bool,
    last_event: Option<AlarmEvent>,
    /// Monotonic ms of the last batch at or above the threshold.
    last_fire_ms: Option<u64>,
    pulse: Option<Worker>,
}

pub struct AlarmCoordinator {
    settings: AlarmSettings,
    actuator: Arc<ActuatorController>,
    notifier: StatusSender,
    clock: MonotonicClock,
    inner: Mutex<Inner>,
}

impl AlarmCoordinator {
    /// Starts enabled and idle.
    pub fn new(settings: AlarmSettings, actuator: Arc<ActuatorController>, notifier: StatusSender) -> Self {
        Self {
            settings,
            actuator,
            notifier,
            clock: MonotonicClock::new(),
            inner: Mutex::new(Inner {
                enabled: true,
                active: false,
                last_event: None,
                last_fire_ms: None,
                pulse: None,
            }),
        }
    }

    // ── Inputs ────────────────────────────────────────────────

    /// Debounced sensor transition.
    pub fn handle_smoke(&self, detected: bool) {
        let action = {
            let mut inner = lock(&self.inner);
            let fire_recent = self.fire_recent(&inner);
            let phase = AlarmPhase::from_flags(inner.enabled, inner.active);
            let action = decide(phase, AlarmInput::Smoke { detected, fire_recent }, self.settings.policy);
            if !action.accepted() {
                debug!("ALARM: smoke={} ignored in {}", detected, phase);
                return;
            }
            inner.last_event = Some(AlarmEvent {
                timestamp_ms: unix_millis(),
                kind: AlarmKind::Smoke,
                source: AlarmSource::Sensor,
                active: detected,
            });
            if detected && fire_recent {
                warn!("ALARM: smoke corroborated by recent fire detection");
            } else if detected && action == Action::Hold {
                info!("ALARM: smoke without recent fire detection, waiting for corroboration");
            }
            self.apply(&mut inner, action);
            action
        };
        self.notify(action);
    }

    /// Max confidence of one detection batch.
    pub fn handle_fire(&self, confidence: f32) {
        let action = {
            let mut inner = lock(&self.inner);
            let phase = AlarmPhase::from_flags(inner.enabled, inner.active);
            let input = AlarmInput::Fire {
                confidence,
                threshold: self.settings.fire_threshold,
            };
            let action = decide(phase, input, self.settings.policy);
            if !action.accepted() {
                debug!("ALARM: fire confidence {:.2} ignored in {}", confidence, phase);
                return;
            }
            warn!("ALARM: fire detected, confidence {:.2}", confidence);
            inner.last_fire_ms = Some(self.clock.now_ms());
            inner.last_event = Some(AlarmEvent {
                timestamp_ms: unix_millis(),
                kind: AlarmKind::Fire,
                source: AlarmSource::Camera,
                active: true,
            });
            self.apply(&mut inner, action);
            action
        };
        self.notify(action);
    }

    /// Manual activation.  Ignored while disabled; idempotent otherwise.
    pub fn activate(&self) {
        self.manual(true);
    }

    /// Manual deactivation.  Returns after the pulse task has exited and
    /// the output is off.
    pub fn deactivate(&self) {
        self.manual(false);
    }

    fn manual(&self, on: bool) {
        let action = {
            let mut inner = lock(&self.inner);
            let phase = AlarmPhase::from_flags(inner.enabled, inner.active);
            let action = decide(phase, AlarmInput::Manual { on }, self.settings.policy);
            if !action.accepted() {
                debug!("ALARM: manual {} ignored in {}", if on { "on" } else { "off" }, phase);
                return;
            }
            self.apply(&mut inner, action);
            action
        };
        self.notify(action);
    }

    /// Disabling forces the alarm off; enabling returns to idle.
    pub fn set_enabled(&self, enabled: bool) {
        let action = {
            let mut inner = lock(&self.inner);
            let phase = AlarmPhase::from_flags(inner.enabled, inner.active);
            let action = decide(phase, AlarmInput::SetEnabled(enabled), self.settings.policy);
            self.apply(&mut inner, action);
            action
        };
        self.notify(action);
    }

    // ── Reads ─────────────────────────────────────────────────

    pub fn status(&self) -> AlarmState {
        let inner = lock(&self.inner);
        AlarmState {
            enabled: inner.enabled,
            active: inner.active,
            last_event: inner.last_event,
        }
    }

    pub fn phase(&self) -> AlarmPhase {
        let inner = lock(&self.inner);
        AlarmPhase::from_flags(inner.enabled, inner.active)
    }

    /// Stop the pulse task and force the output off without notifying.
    /// Used at shutdown; idempotent.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        self.stop_pulse(&mut inner);
        inner.active = false;
    }

    // ── Internals ─────────────────────────────────────────────

    fn fire_recent(&self, inner: &Inner) -> bool {
        let window = self.settings.corroboration_window.as_millis() as u64;
        inner
            .last_fire_ms
            .is_some_and(|at| self.clock.now_ms().saturating_sub(at) <= window)
    }

    fn apply(&self, inner: &mut Inner, action: Action) {
        match action {
            Action::Ignore | Action::Hold => {}
            Action::Activate => self.start_pulse(inner),
            Action::Deactivate => {
                if inner.active {
                    info!("ALARM: deactivated");
                }
                self.stop_pulse(inner);
                inner.active = false;
            }
            Action::Enable => {
                inner.enabled = true;
                info!("ALARM: enabled");
            }
            Action::Disable => {
                self.stop_pulse(inner);
                inner.active = false;
                inner.enabled = false;
                info!("ALARM: disabled");
            }
        }
    }

    fn start_pulse(&self, inner: &mut Inner) {
        if inner.active && inner.pulse.as_ref().is_some_and(|w| !w.is_finished()) {
            return;
        }
        inner.active = true;
        let actuator = Arc::clone(&self.actuator);
        let half = self.settings.pulse_half_period;
        match Worker::spawn("alarm-pulse", move |stop| pulse_loop(&actuator, half, &stop)) {
            Ok(worker) => {
                inner.pulse = Some(worker);
                warn!("ALARM: activated, pulsing {}ms on/off", half.as_millis());
            }
            Err(e) => {
                // Without a pulse task the output is held on steadily.
                error!("ALARM: {}, holding output on", e);
                let _ = self.actuator.set(true);
            }
        }
    }

    fn stop_pulse(&self, inner: &mut Inner) {
        if let Some(mut worker) = inner.pulse.take() {
            if let Err(e) = worker.stop(self.settings.join_timeout) {
                error!("ALARM: {}", e);
            }
        }
        if let Err(e) = self.actuator.set(false) {
            error!("ALARM: could not force output off: {}", e);
        }
    }

    fn notify(&self, action: Action) {
        if action.accepted() {
            self.notifier.notify(StatusCause::Alarm);
        }
    }
}

fn pulse_loop(actuator: &ActuatorController, half: Duration, stop: &StopToken) {
    loop {
        let _ = actuator.set(true);
        if stop.sleep_blocking(half) {
            break;
        }
        let _ = actuator.set(false);
        if stop.sleep_blocking(half) {
            break;
        }
    }
    let _ = actuator.set(false);
}

impl SmokeObserver for AlarmCoordinator {
    fn on_smoke(&self, event: SmokeEvent) {
        self.handle_smoke(event.detected);
    }
}

impl FireObserver for AlarmCoordinator {
    fn on_fire(&self, confidence: f32) {
        self.handle_fire(confidence);
    }
}

impl Drop for AlarmCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
