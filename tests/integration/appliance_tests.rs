//! End-to-end tests of the assembled appliance on simulated hardware.

use std::time::Duration;

use smokewatch::app::commands::{AppCommand, CommandReply};
use smokewatch::app::events::{AlarmKind, StatusCause};
use smokewatch::app::service::Appliance;
use smokewatch::error::{CaptureError, Error};

use crate::mock_hw::{RecordingSink, Reply, Rig, ScriptedDetector, detection, fast_config, wait_until};

const SETTLE: Duration = Duration::from_secs(3);

fn started(detector: ScriptedDetector) -> (Appliance, Rig, RecordingSink) {
    let (rig, hw) = Rig::build();
    let app = Appliance::new(fast_config(), hw, detector);
    let sink = RecordingSink::new();
    app.start(sink.boxed()).unwrap();
    assert!(wait_until(SETTLE, || app.sensor().is_running()));
    (app, rig, sink)
}

#[test]
fn smoke_contact_drives_the_alarm() {
    let (app, rig, sink) = started(ScriptedDetector::new());

    rig.smoke.set_level(true);
    assert!(wait_until(SETTLE, || app.alarm().status().active), "smoke must raise the alarm");
    assert!(wait_until(SETTLE, || rig.alarm.rising_edges() >= 1));
    let ev = app.alarm().status().last_event.unwrap();
    assert_eq!(ev.kind, AlarmKind::Smoke);

    rig.smoke.set_level(false);
    assert!(wait_until(SETTLE, || !app.alarm().status().active), "clear must silence it");
    assert!(!rig.alarm.level());

    app.shutdown().unwrap();
    assert!(sink.causes().contains(&StatusCause::Alarm));
}

#[test]
fn high_confidence_region_in_batch_raises_alarm() {
    let detector = ScriptedDetector::always(Reply::Detections(vec![detection(0.4), detection(0.9)]));
    let (app, _rig, _sink) = started(detector);

    assert!(wait_until(SETTLE, || app.alarm().status().active));
    let ev = app.alarm().status().last_event.unwrap();
    assert_eq!(ev.kind, AlarmKind::Fire);
    app.shutdown().unwrap();
}

#[test]
fn low_confidence_batches_never_alarm() {
    let detector = ScriptedDetector::always(Reply::Detections(vec![detection(0.4), detection(0.69)]));
    let (app, _rig, sink) = started(detector.clone());

    assert!(wait_until(SETTLE, || detector.calls() >= 3));
    assert!(wait_until(SETTLE, || !sink.frames().is_empty()));
    assert!(!app.alarm().status().active);
    assert_eq!(app.capture().camera_status().detection_count, 2);
    app.shutdown().unwrap();
}

#[test]
fn commands_are_answered_and_applied() {
    let (app, rig, sink) = started(ScriptedDetector::new());

    assert_eq!(app.handle_command(AppCommand::SetEnabled(false)), CommandReply::Ack);
    assert_eq!(app.handle_command(AppCommand::ControlAlarm(true)), CommandReply::Ack);
    match app.handle_command(AppCommand::GetStatus) {
        CommandReply::Status(s) => {
            assert_eq!(s.cause, StatusCause::Query);
            assert!(!s.alarm.enabled);
            assert!(!s.alarm.active, "disabled alarm ignores manual activation");
            assert!(s.camera.running);
        }
        other => panic!("unexpected reply {other:?}"),
    }

    app.handle_command(AppCommand::SetEnabled(true));
    app.handle_command(AppCommand::ControlAlarm(true));
    assert!(app.alarm().status().active);
    app.handle_command(AppCommand::ControlAlarm(false));
    assert!(!app.alarm().status().active);
    assert!(!rig.alarm.level());

    assert!(wait_until(SETTLE, || matches!(
        app.handle_command(AppCommand::GetFrame),
        CommandReply::Frame(Some(_))
    )));

    app.handle_command(AppCommand::ClientConnected { client_id: 7 });
    app.shutdown().unwrap();
    assert!(
        sink.causes()
            .contains(&StatusCause::ClientConnected { client_id: 7 })
    );
}

#[test]
fn camera_open_failure_aborts_start() {
    let (rig, hw) = Rig::build();
    rig.camera.set_open_fails(true);
    let app = Appliance::new(fast_config(), hw, ScriptedDetector::new());

    let err = app.start(RecordingSink::new().boxed()).unwrap_err();
    assert!(matches!(err, Error::Capture(CaptureError::OpenFailed(_))));
    assert!(!app.sensor().is_running());
    assert!(!app.capture().camera_status().running);
}

#[test]
fn sensor_retries_until_line_is_free() {
    let (rig, hw) = Rig::build();
    rig.smoke.fail_next_acquires(3);
    let app = Appliance::new(fast_config(), hw, ScriptedDetector::new());
    app.start(RecordingSink::new().boxed()).unwrap();

    assert!(wait_until(SETTLE, || rig.smoke.acquires() == 1));
    rig.smoke.set_level(true);
    assert!(wait_until(SETTLE, || app.alarm().status().active));
    app.shutdown().unwrap();
}

#[test]
fn sensor_stop_is_idempotent() {
    let (app, rig, _sink) = started(ScriptedDetector::new());
    assert_eq!(app.sensor().stop(), Ok(()));
    assert_eq!(app.sensor().stop(), Ok(()));
    assert!(!app.sensor().is_running());

    // Line released: flipping it no longer reaches the alarm.
    rig.smoke.set_level(true);
    std::thread::sleep(Duration::from_millis(500));
    assert!(!app.alarm().status().active);
    app.shutdown().unwrap();
}

#[test]
fn shutdown_is_ordered_and_idempotent() {
    let (app, rig, sink) = started(ScriptedDetector::new());
    app.handle_command(AppCommand::ControlAlarm(true));

    assert_eq!(app.shutdown(), Ok(()));
    assert_eq!(app.shutdown(), Ok(()));

    assert!(!rig.alarm.level(), "output left low");
    assert!(!app.sensor().is_running());
    assert!(!app.capture().camera_status().running);

    // The capture stop notice was published before the consumer exited.
    let last = sink.statuses().pop().unwrap();
    assert_eq!(last.cause, StatusCause::Camera);
    assert!(!last.camera.running);
}
