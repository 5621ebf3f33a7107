//! Alarm state machine.
//!
//! ```text
//!              smoke detected / fire ≥ threshold / manual on
//!   ┌──────┐ ─────────────────────────────────────────────▶ ┌─────────┐
//!   │ Idle │                                                │ Pulsing │
//!   └──────┘ ◀───────────────────────────────────────────── └─────────┘
//!      ▲  │    smoke cleared, no recent fire / manual off        │
//!      │  │                                                      │
//!  enable │ disable                                      disable │
//!      │  ▼                                                      ▼
//!   ┌──────────┐ ◀───────────────────────────────────────────────┘
//!   │ Disabled │   every input except enable is ignored here
//!   └──────────┘
//! ```
//!
//! [`decide`] is the pure transition table: it maps the current phase and
//! one input to the [`Action`] the coordinator must carry out.  All side
//! effects (pulse task, actuator, notification) live in
//! [`coordinator::AlarmCoordinator`].

pub mod coordinator;

use crate::config::SmokePolicy;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmPhase {
    Disabled,
    Idle,
    Pulsing,
}

impl AlarmPhase {
    /// Phase implied by the coordinator's two flags.  `enabled` wins.
    pub fn from_flags(enabled: bool, active: bool) -> Self {
        match (enabled, active) {
            (false, _) => Self::Disabled,
            (true, false) => Self::Idle,
            (true, true) => Self::Pulsing,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Idle => "Idle",
            Self::Pulsing => "Pulsing",
        }
    }
}

impl core::fmt::Display for AlarmPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Inputs and actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlarmInput {
    /// Debounced sensor transition.  `fire_recent` is true when a detection
    /// batch at or above the threshold arrived within the corroboration
    /// window.
    Smoke { detected: bool, fire_recent: bool },
    /// Max confidence of one detection batch.
    Fire { confidence: f32, threshold: f32 },
    /// Operator command.
    Manual { on: bool },
    SetEnabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Not accepted: no state change, no notification.
    Ignore,
    /// Accepted; state stays as it is.
    Hold,
    /// Enter (or stay in) Pulsing.
    Activate,
    /// Leave Pulsing (idempotent in Idle).
    Deactivate,
    /// Disabled → Idle.
    Enable,
    /// Any → Disabled, forcing the output off.
    Disable,
}

impl Action {
    /// Whether the call was accepted (and therefore notifies observers).
    pub fn accepted(self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

/// `true` when `confidence` reaches `threshold` (inclusive).  NaN never does.
pub fn fire_reaches(confidence: f32, threshold: f32) -> bool {
    confidence >= threshold
}

/// The transition table.
pub fn decide(phase: AlarmPhase, input: AlarmInput, policy: SmokePolicy) -> Action {
    match (phase, input) {
        (_, AlarmInput::SetEnabled(false)) => Action::Disable,
        (AlarmPhase::Disabled, AlarmInput::SetEnabled(true)) => Action::Enable,
        (_, AlarmInput::SetEnabled(true)) => Action::Hold,

        (AlarmPhase::Disabled, _) => Action::Ignore,

        (_, AlarmInput::Fire { confidence, threshold }) => {
            if fire_reaches(confidence, threshold) {
                Action::Activate
            } else {
                Action::Ignore
            }
        }

        (_, AlarmInput::Manual { on: true }) => Action::Activate,
        (_, AlarmInput::Manual { on: false }) => Action::Deactivate,

        (_, AlarmInput::Smoke { detected: true, fire_recent }) => match policy {
            SmokePolicy::Standalone => Action::Activate,
            SmokePolicy::RequireCorroboration if fire_recent => Action::Activate,
            SmokePolicy::RequireCorroboration => Action::Hold,
        },
        (_, AlarmInput::Smoke { detected: false, fire_recent: true }) => Action::Hold,
        (_, AlarmInput::Smoke { detected: false, fire_recent: false }) => Action::Deactivate,
    }
}
