//! Log-based publish sink adapter.
//!
//! Implements [`PublishSink`] by writing one structured line per snapshot
//! and per frame update to the log.  The host binary uses it when no
//! transport layer is attached; a WebSocket or MQTT adapter would
//! implement the same trait.

use log::info;

use crate::app::events::{FrameUpdate, StatusCause, StatusSnapshot};
use crate::app::ports::PublishSink;

/// Adapter that logs every publication.
#[derive(Debug, Default)]
pub struct LogPublishSink {
    published: u64,
}

impl LogPublishSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publications written so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl PublishSink for LogPublishSink {
    fn publish_status(&mut self, s: &StatusSnapshot) {
        self.published += 1;
        let cause = match s.cause {
            StatusCause::Alarm => "alarm".to_string(),
            StatusCause::Camera => "camera".to_string(),
            StatusCause::ClientConnected { client_id } => format!("client#{client_id}"),
            StatusCause::Query => "query".to_string(),
        };
        let last = s.alarm.last_event.map_or_else(
            || "none".to_string(),
            |e| format!("{:?}/{:?} active={}", e.kind, e.source, e.active),
        );
        info!(
            "STATUS | cause={} | enabled={} active={} | last={} | camera={} {}x{} @{:.1}fps | detections={}",
            cause,
            s.alarm.enabled,
            s.alarm.active,
            last,
            if s.camera.running { "up" } else { "down" },
            s.camera.resolution.0,
            s.camera.resolution.1,
            s.camera.target_fps,
            s.camera.detection_count,
        );
    }

    fn publish_frame(&mut self, u: &FrameUpdate) {
        self.published += 1;
        let max = u
            .detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f32, f32::max);
        info!(
            "FRAME  | raw={}B processed={}B | detections={} max_conf={:.2}",
            u.raw_frame_b64.as_ref().map_or(0, String::len),
            u.processed_frame_b64.as_ref().map_or(0, String::len),
            u.detections.len(),
            max,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::{AlarmState, CameraStatus};

    #[test]
    fn counts_publications() {
        let mut sink = LogPublishSink::new();
        sink.publish_status(&StatusSnapshot {
            cause: StatusCause::ClientConnected { client_id: 3 },
            alarm: AlarmState {
                enabled: true,
                active: false,
                last_event: None,
            },
            camera: CameraStatus::stopped(1.0),
            detections: Vec::new(),
        });
        sink.publish_frame(&FrameUpdate {
            raw_frame_b64: None,
            processed_frame_b64: None,
            detections: Vec::new(),
        });
        assert_eq!(sink.published(), 2);
    }
}
