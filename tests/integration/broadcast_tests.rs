//! Status broadcaster ordering, draining and backpressure.

use std::sync::Arc;
use std::time::Duration;

use smokewatch::app::events::{AlarmState, CameraStatus, FireDetection, FrameUpdate, StatusCause};
use smokewatch::app::ports::StatusSource;
use smokewatch::broadcast::{BroadcastSettings, STATUS_QUEUE_DEPTH, StatusBroadcaster};

use crate::mock_hw::{Published, RecordingSink};

struct Idle;

impl StatusSource for Idle {
    fn alarm_state(&self) -> AlarmState {
        AlarmState {
            enabled: true,
            active: false,
            last_event: None,
        }
    }

    fn camera_status(&self) -> CameraStatus {
        CameraStatus::stopped(1.0)
    }

    fn detections(&self) -> Vec<FireDetection> {
        Vec::new()
    }
}

fn broadcaster(stall_warning: Duration) -> StatusBroadcaster {
    StatusBroadcaster::new(BroadcastSettings {
        stall_warning,
        join_timeout: Duration::from_secs(2),
    })
}

fn client_ids(sink: &RecordingSink) -> Vec<u64> {
    sink.causes()
        .into_iter()
        .filter_map(|c| match c {
            StatusCause::ClientConnected { client_id } => Some(client_id),
            _ => None,
        })
        .collect()
}

#[test]
fn concurrent_producers_keep_their_own_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 50;

    let b = broadcaster(Duration::from_secs(5));
    let sink = RecordingSink::new();
    b.start(Arc::new(Idle), sink.boxed()).unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = b.sender();
            std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    assert!(tx.notify(StatusCause::ClientConnected {
                        client_id: p * 1000 + i
                    }));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    b.shutdown().unwrap();

    let ids = client_ids(&sink);
    assert_eq!(ids.len() as u64, PRODUCERS * PER_PRODUCER, "nothing dropped");
    for p in 0..PRODUCERS {
        let mine: Vec<u64> = ids.iter().copied().filter(|id| id / 1000 == p).collect();
        let expected: Vec<u64> = (0..PER_PRODUCER).map(|i| p * 1000 + i).collect();
        assert_eq!(mine, expected, "producer {p} out of order");
    }
}

#[test]
fn statuses_and_frames_share_one_fifo() {
    let b = broadcaster(Duration::from_secs(1));
    let tx = b.sender();
    tx.notify(StatusCause::Alarm);
    tx.publish_frame(FrameUpdate {
        raw_frame_b64: Some("AAAA".into()),
        processed_frame_b64: None,
        detections: Vec::new(),
    });
    tx.notify(StatusCause::Camera);

    let sink = RecordingSink::new();
    b.start(Arc::new(Idle), sink.boxed()).unwrap();
    b.shutdown().unwrap();

    let kinds: Vec<&str> = sink
        .all()
        .iter()
        .map(|p| match p {
            Published::Status(s) if s.cause == StatusCause::Alarm => "alarm",
            Published::Status(_) => "status",
            Published::Frame(_) => "frame",
        })
        .collect();
    assert_eq!(kinds, vec!["alarm", "frame", "status"]);
}

#[test]
fn shutdown_drains_queue_then_refuses() {
    let b = broadcaster(Duration::from_secs(1));
    let tx = b.sender();
    for id in 0..20 {
        assert!(tx.notify(StatusCause::ClientConnected { client_id: id }));
    }
    let sink = RecordingSink::new();
    b.start(Arc::new(Idle), sink.boxed()).unwrap();
    b.shutdown().unwrap();
    b.shutdown().unwrap();

    assert_eq!(client_ids(&sink), (0..20).collect::<Vec<_>>());
    assert!(!b.is_running());
    assert!(!tx.notify(StatusCause::Alarm));
    assert_eq!(sink.all().len(), 20);
}

#[test]
fn blocked_producer_resumes_when_consumer_starts() {
    let b = broadcaster(Duration::from_millis(50));
    let tx = b.sender();
    for id in 0..STATUS_QUEUE_DEPTH as u64 {
        assert!(tx.notify(StatusCause::ClientConnected { client_id: id }));
    }

    let late = {
        let tx = tx.clone();
        std::thread::spawn(move || {
            tx.notify(StatusCause::ClientConnected {
                client_id: STATUS_QUEUE_DEPTH as u64,
            })
        })
    };
    std::thread::sleep(Duration::from_millis(200));
    assert!(!late.is_finished(), "producer must block on a full queue");
    assert_eq!(b.stalls(), 1, "a long wait is reported, not dropped");

    let sink = RecordingSink::new();
    b.start(Arc::new(Idle), sink.boxed()).unwrap();
    assert!(late.join().unwrap());
    b.shutdown().unwrap();

    assert_eq!(
        client_ids(&sink),
        (0..=STATUS_QUEUE_DEPTH as u64).collect::<Vec<_>>()
    );
}
