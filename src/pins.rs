//! Default GPIO line assignments for the reference Raspberry Pi carrier.
//!
//! These are only defaults for [`SystemConfig`](crate::config::SystemConfig);
//! the deployed values come from configuration.  BCM numbering.

// ---------------------------------------------------------------------------
// Smoke detector (digital alarm contact)
// ---------------------------------------------------------------------------

/// Digital input: detector alarm contact.  HIGH = smoke present.
/// Physical header pin 13.
pub const SMOKE_SENSOR_BCM: u32 = 27;

// ---------------------------------------------------------------------------
// Alarm actuator (sounder / strobe through a driver transistor)
// ---------------------------------------------------------------------------

/// Digital output: HIGH = sounder energised.  Physical header pin 12.
pub const ALARM_OUTPUT_BCM: u32 = 18;
