//! Alarm coordinator against a recording output line and a live
//! broadcaster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smokewatch::app::events::{AlarmKind, AlarmSource, AlarmState, CameraStatus, FireDetection, StatusCause};
use smokewatch::app::ports::StatusSource;
use smokewatch::broadcast::{BroadcastSettings, StatusBroadcaster};
use smokewatch::config::SmokePolicy;
use smokewatch::drivers::actuator::ActuatorController;
use smokewatch::fsm::AlarmPhase;
use smokewatch::fsm::coordinator::{AlarmCoordinator, AlarmSettings};

use crate::mock_hw::{RecordingOutput, RecordingSink, wait_until};

struct AlarmOnly(Arc<AlarmCoordinator>);

impl StatusSource for AlarmOnly {
    fn alarm_state(&self) -> AlarmState {
        self.0.status()
    }

    fn camera_status(&self) -> CameraStatus {
        CameraStatus::stopped(1.0)
    }

    fn detections(&self) -> Vec<FireDetection> {
        Vec::new()
    }
}

struct Fixture {
    alarm: Arc<AlarmCoordinator>,
    output: RecordingOutput,
    sink: RecordingSink,
    broadcaster: StatusBroadcaster,
}

fn fixture(policy: SmokePolicy) -> Fixture {
    let broadcaster = StatusBroadcaster::new(BroadcastSettings {
        stall_warning: Duration::from_secs(1),
        join_timeout: Duration::from_secs(1),
    });
    let output = RecordingOutput::new();
    let actuator = Arc::new(ActuatorController::new(output.provider()));
    actuator.init().unwrap();
    let alarm = Arc::new(AlarmCoordinator::new(
        AlarmSettings {
            fire_threshold: 0.7,
            corroboration_window: Duration::from_secs(10),
            policy,
            pulse_half_period: Duration::from_millis(40),
            join_timeout: Duration::from_secs(1),
        },
        actuator,
        broadcaster.sender(),
    ));
    let sink = RecordingSink::new();
    broadcaster
        .start(Arc::new(AlarmOnly(Arc::clone(&alarm))), sink.boxed())
        .unwrap();
    Fixture {
        alarm,
        output,
        sink,
        broadcaster,
    }
}

#[test]
fn deactivate_returns_with_output_off_and_no_later_pulses() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.activate();
    assert!(f.alarm.status().active);
    assert!(
        wait_until(Duration::from_secs(2), || f.output.rising_edges() >= 2),
        "pulse task should toggle the output"
    );

    f.alarm.deactivate();
    let after = Instant::now();
    assert!(!f.alarm.status().active);
    assert!(!f.output.level(), "output must be low when deactivate returns");

    std::thread::sleep(Duration::from_millis(200));
    assert!(
        !f.output.writes_since(after).contains(&true),
        "no pulse may follow deactivate"
    );
}

#[test]
fn disabled_coordinator_ignores_smoke_and_fire() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.set_enabled(false);

    f.alarm.handle_smoke(true);
    f.alarm.handle_fire(0.99);
    f.alarm.activate();

    let s = f.alarm.status();
    assert!(!s.enabled);
    assert!(!s.active);
    assert_eq!(s.last_event, None);
    assert!(!f.output.level());
    assert_eq!(f.alarm.phase(), AlarmPhase::Disabled);
}

#[test]
fn disabling_silences_an_active_alarm() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.handle_smoke(true);
    assert!(f.alarm.status().active);

    f.alarm.set_enabled(false);
    assert!(!f.alarm.status().active);
    assert!(!f.output.level());

    f.alarm.set_enabled(true);
    assert_eq!(f.alarm.phase(), AlarmPhase::Idle, "enabling never re-activates");
}

#[test]
fn fire_threshold_is_inclusive() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.handle_fire(0.69);
    assert!(!f.alarm.status().active);

    f.alarm.handle_fire(0.70);
    let s = f.alarm.status();
    assert!(s.active);
    let ev = s.last_event.unwrap();
    assert_eq!(ev.kind, AlarmKind::Fire);
    assert_eq!(ev.source, AlarmSource::Camera);
}

#[test]
fn smoke_clear_keeps_alarm_while_fire_is_recent() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.handle_fire(0.9);
    f.alarm.handle_smoke(true);
    f.alarm.handle_smoke(false);
    assert!(f.alarm.status().active, "recent fire holds the alarm");

    f.alarm.deactivate();
    assert!(!f.alarm.status().active);
}

#[test]
fn corroboration_policy_waits_for_fire() {
    let f = fixture(SmokePolicy::RequireCorroboration);
    f.alarm.handle_smoke(true);
    assert!(!f.alarm.status().active, "smoke alone must not sound");
    let ev = f.alarm.status().last_event.unwrap();
    assert_eq!(ev.kind, AlarmKind::Smoke);
    assert!(ev.active);

    f.alarm.handle_fire(0.8);
    f.alarm.handle_smoke(true);
    assert!(f.alarm.status().active);
}

#[test]
fn every_accepted_command_notifies_once() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.activate();
    f.alarm.activate();
    f.alarm.handle_fire(0.1); // ignored
    f.alarm.deactivate();
    f.broadcaster.shutdown().unwrap();

    assert_eq!(
        f.sink.causes(),
        vec![StatusCause::Alarm, StatusCause::Alarm, StatusCause::Alarm]
    );
    let statuses = f.sink.statuses();
    assert!(!statuses.last().unwrap().alarm.active);
}

#[test]
fn stop_is_idempotent_and_forces_output_off() {
    let f = fixture(SmokePolicy::Standalone);
    f.alarm.activate();
    f.alarm.stop();
    f.alarm.stop();
    assert!(!f.alarm.status().active);
    assert!(!f.output.level());

    let writes = f.output.write_count();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(f.output.write_count(), writes, "pulse task has exited");
}
