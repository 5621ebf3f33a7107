//! Client side of the fire-detection service contract.
//!
//! ```text
//!   request   POST {"image": "<base64 JPEG>"}
//!   response  200 {"detections": [{"bbox": [x1,y1,x2,y2], "confidence": f, "class": i}],
//!                  "processed_frame": "<base64 JPEG>"}
//! ```
//!
//! | Outcome                         | Result for this cycle                      |
//! |---------------------------------|--------------------------------------------|
//! | timeout / transport / non-200   | `Err`, logged, no fire forwarded           |
//! | malformed JSON                  | `Err`, logged, no fire forwarded           |
//! | bad base64 in `processed_frame` | `Err(Decode)`, whole result discarded      |
//! | success, empty `detections`     | `Ok`, nothing forwarded                    |
//! | success                         | `Ok`, max confidence forwarded to observer |
//!
//! A failure never reaches the capture loop; the pipeline clears its
//! detections and keeps going.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::FireDetection;
use crate::app::ports::{Analysis, DetectorTransport, FireObserver, FrameAnalyzer};
use crate::config::SystemConfig;
use crate::drivers::worker::FailureCounter;
use crate::error::DetectionError;

/// Log the first failure and then every tenth while the service is down.
const FAILURE_LOG_EVERY: u32 = 10;

/// Request body.
#[derive(Debug, Serialize)]
pub struct DetectRequest<'a> {
    pub image: &'a str,
}

/// 200 response body.  Missing fields read as empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<FireDetection>,
    #[serde(default)]
    pub processed_frame: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSettings {
    pub timeout: Duration,
}

impl DetectionSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.detection_timeout_ms.into()),
        }
    }
}

pub struct DetectionClient<T: DetectorTransport> {
    transport: T,
    observer: Arc<dyn FireObserver>,
    settings: DetectionSettings,
    failures: FailureCounter,
}

impl<T: DetectorTransport> DetectionClient<T> {
    pub fn new(transport: T, observer: Arc<dyn FireObserver>, settings: DetectionSettings) -> Self {
        Self {
            transport,
            observer,
            settings,
            failures: FailureCounter::new(FAILURE_LOG_EVERY),
        }
    }

    /// Submit one JPEG frame and interpret the response.
    pub fn detect(&mut self, jpeg: &[u8]) -> Result<Analysis, DetectionError> {
        let image = BASE64.encode(jpeg);
        let request = DetectRequest { image: &image };

        let response = match self.transport.submit(&request, self.settings.timeout) {
            Ok(r) => r,
            Err(e) => {
                if self.failures.record() {
                    warn!(
                        "DETECT: request failed ({}), {} consecutive failure(s)",
                        e,
                        self.failures.count()
                    );
                }
                return Err(e);
            }
        };
        let previous = self.failures.reset();
        if previous > 0 {
            info!("DETECT: service reachable again after {} failure(s)", previous);
        }

        let processed_jpeg = match response.processed_frame.as_deref() {
            Some(b64) if !b64.is_empty() => Some(BASE64.decode(b64).map_err(|e| {
                warn!("DETECT: processed frame is not valid base64 ({}), discarding result", e);
                DetectionError::Decode
            })?),
            _ => None,
        };

        let detections = sanitize(response.detections);
        if let Some(max) = FireDetection::max_confidence(&detections) {
            debug!("DETECT: {} region(s), max confidence {:.2}", detections.len(), max);
            self.observer.on_fire(max);
        }

        Ok(Analysis {
            detections,
            processed_jpeg,
        })
    }
}

impl<T: DetectorTransport> FrameAnalyzer for DetectionClient<T> {
    fn analyze(&mut self, jpeg: &[u8]) -> Result<Analysis, DetectionError> {
        self.detect(jpeg)
    }
}

/// Drop regions whose confidence is outside `[0, 1]` or not a number.
fn sanitize(detections: Vec<FireDetection>) -> Vec<FireDetection> {
    let before = detections.len();
    let kept: Vec<FireDetection> = detections
        .into_iter()
        .filter(|d| (0.0..=1.0).contains(&d.confidence))
        .collect();
    if kept.len() != before {
        warn!("DETECT: dropped {} region(s) with invalid confidence", before - kept.len());
    }
    kept
}
