//! Capture pipeline with the simulated camera and a scripted detector.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use smokewatch::adapters::sim::{SimCamera, SimCameraControl};
use smokewatch::app::events::{AlarmState, CameraStatus, FireDetection, StatusCause};
use smokewatch::app::ports::{FireObserver, StatusSource};
use smokewatch::broadcast::{BroadcastSettings, StatusBroadcaster};
use smokewatch::error::{CaptureError, DetectionError, Error};
use smokewatch::vision::capture::{CapturePipeline, CaptureSettings, CaptureState};
use smokewatch::vision::detection::{DetectionClient, DetectionSettings};

use crate::mock_hw::{Published, RecordingSink, Reply, ScriptedDetector, detection, fast_config, wait_until};

#[derive(Default)]
struct FireLog(Mutex<Vec<f32>>);

impl FireObserver for FireLog {
    fn on_fire(&self, confidence: f32) {
        self.0.lock().unwrap().push(confidence);
    }
}

struct CaptureOnly(Arc<CaptureState>);

impl StatusSource for CaptureOnly {
    fn alarm_state(&self) -> AlarmState {
        AlarmState {
            enabled: true,
            active: false,
            last_event: None,
        }
    }

    fn camera_status(&self) -> CameraStatus {
        self.0.camera_status()
    }

    fn detections(&self) -> Vec<FireDetection> {
        self.0.detections()
    }
}

struct Fixture {
    pipeline: CapturePipeline,
    camera: Arc<SimCameraControl>,
    fires: Arc<FireLog>,
    sink: RecordingSink,
    broadcaster: StatusBroadcaster,
}

fn fixture(detector: ScriptedDetector) -> Fixture {
    let config = fast_config();
    let broadcaster = StatusBroadcaster::new(BroadcastSettings::from_config(&config));
    let camera = SimCameraControl::new(Duration::from_millis(5));
    let fires = Arc::new(FireLog::default());
    let client = DetectionClient::new(
        detector,
        fires.clone(),
        DetectionSettings::from_config(&config),
    );
    let pipeline = CapturePipeline::new(
        CaptureSettings::from_config(&config),
        Box::new(SimCamera::new(Arc::clone(&camera))),
        Box::new(client),
        broadcaster.sender(),
    );
    let sink = RecordingSink::new();
    broadcaster
        .start(Arc::new(CaptureOnly(pipeline.state())), sink.boxed())
        .unwrap();
    Fixture {
        pipeline,
        camera,
        fires,
        sink,
        broadcaster,
    }
}

#[test]
fn frames_stay_fresh_while_every_detection_times_out() {
    let detector = ScriptedDetector::always(Reply::Hang);
    let f = fixture(detector.clone());
    f.pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || f.pipeline.get_frame().is_some()));
    let first = f.pipeline.get_frame().unwrap();
    assert!(wait_until(Duration::from_secs(2), || f.pipeline.get_frame().as_ref() != Some(&first)));
    assert!(wait_until(Duration::from_secs(2), || detector.calls() >= 2));

    // Frames kept flowing during the hung requests.
    let reads_before = f.camera.reads();
    std::thread::sleep(Duration::from_millis(150));
    assert!(f.camera.reads() > reads_before);

    let status = f.pipeline.camera_status();
    assert!(status.running);
    assert_eq!(status.detection_count, 0);
    assert!(f.fires.0.lock().unwrap().is_empty());

    f.pipeline.stop().unwrap();
}

#[test]
fn open_failure_is_returned_and_nothing_runs() {
    let f = fixture(ScriptedDetector::new());
    f.camera.set_open_fails(true);

    let err = f.pipeline.start().unwrap_err();
    assert!(matches!(err, Error::Capture(CaptureError::OpenFailed(_))));
    assert!(!f.pipeline.camera_status().running);
    assert_eq!(f.pipeline.get_frame(), None);
    assert_eq!(f.pipeline.stop(), Ok(()));
}

#[test]
fn successful_detection_publishes_frame_and_forwards_max_confidence() {
    let processed = BASE64.encode(b"annotated");
    let detector = ScriptedDetector::always(Reply::Processed(
        vec![detection(0.4), detection(0.9)],
        processed.clone(),
    ));
    let f = fixture(detector);
    f.pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || !f.sink.frames().is_empty()));
    let update = f.sink.frames().remove(0);
    assert_eq!(update.processed_frame_b64.as_deref(), Some(processed.as_str()));
    assert!(update.raw_frame_b64.is_some());
    assert_eq!(update.detections.len(), 2);
    assert_eq!(f.fires.0.lock().unwrap().first().copied(), Some(0.9));
    assert_eq!(f.pipeline.camera_status().detection_count, 2);

    f.pipeline.stop().unwrap();
}

#[test]
fn failed_detection_clears_previous_detections() {
    let detector = ScriptedDetector::always(Reply::Fail(DetectionError::Status(503)));
    detector.push(Reply::Detections(vec![detection(0.8)]));
    let f = fixture(detector.clone());
    f.pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || f.sink.frames().len() == 1));
    assert_eq!(f.sink.frames()[0].detections.len(), 1);
    assert!(wait_until(Duration::from_secs(2), || detector.calls() >= 2));
    assert!(wait_until(Duration::from_secs(2), || f.pipeline.detections().is_empty()));
    assert_eq!(f.sink.frames().len(), 1, "failed cycles publish no frame");

    // Observers learn that the detections went away.
    assert!(wait_until(Duration::from_secs(2), || {
        let all = f.sink.all();
        all.iter()
            .position(|p| matches!(p, Published::Frame(_)))
            .is_some_and(|i| {
                all[i + 1..].iter().any(|p| {
                    matches!(p, Published::Status(s)
                        if s.cause == StatusCause::Camera && s.camera.running && s.detections.is_empty())
                })
            })
    }));
    f.pipeline.stop().unwrap();
}

#[test]
fn persistent_read_failures_reopen_the_device() {
    let f = fixture(ScriptedDetector::new());
    f.pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || f.camera.reads() > 0));

    f.camera.set_broken(true);
    assert!(wait_until(Duration::from_secs(2), || f.camera.opens() >= 2));
    assert!(wait_until(Duration::from_secs(2), || !f.pipeline.camera_status().running));

    f.camera.set_broken(false);
    assert!(wait_until(Duration::from_secs(2), || f.pipeline.camera_status().running));

    f.pipeline.stop().unwrap();
    f.broadcaster.shutdown().unwrap();
    let camera_notices = f
        .sink
        .causes()
        .into_iter()
        .filter(|c| *c == StatusCause::Camera)
        .count();
    // started, degraded, recovered, stopped
    assert!(camera_notices >= 4, "got {camera_notices} camera notices");
}

#[test]
fn stop_is_idempotent() {
    let f = fixture(ScriptedDetector::new());
    f.pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || f.pipeline.get_frame().is_some()));
    assert_eq!(f.pipeline.stop(), Ok(()));
    assert_eq!(f.pipeline.stop(), Ok(()));
    let status = f.pipeline.camera_status();
    assert!(!status.running);
    assert_eq!(status.resolution, (0, 0));
    assert_eq!(f.pipeline.get_frame(), None, "last frame released with the camera");

    let reads = f.camera.reads();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(f.camera.reads(), reads, "capture loop has exited");
}
