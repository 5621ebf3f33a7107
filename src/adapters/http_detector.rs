//! HTTP transport to the fire-detection service.
//!
//! Implements [`DetectorTransport`] with a blocking `reqwest` client.  The
//! detector worker is a plain thread, so no async runtime is needed; each
//! request carries its own timeout.

use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;

use crate::app::ports::DetectorTransport;
use crate::error::DetectionError;
use crate::vision::detection::{DetectRequest, DetectResponse};

/// Connect timeout; the request timeout comes from the caller.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HttpDetector {
    client: Client,
    url: String,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("smokewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DetectionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn map_error(e: &reqwest::Error) -> DetectionError {
    if e.is_timeout() {
        DetectionError::Timeout
    } else if e.is_decode() {
        DetectionError::Malformed(e.to_string())
    } else {
        DetectionError::Transport(e.to_string())
    }
}

impl DetectorTransport for HttpDetector {
    fn submit(&self, request: &DetectRequest<'_>, timeout: Duration) -> Result<DetectResponse, DetectionError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(request)
            .send()
            .map_err(|e| map_error(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DetectionError::Status(status.as_u16()));
        }

        let body: DetectResponse = response.json().map_err(|e| match map_error(&e) {
            DetectionError::Transport(why) => DetectionError::Malformed(why),
            other => other,
        })?;
        debug!(
            "DETECT: {} answered with {} region(s)",
            self.url,
            body.detections.len()
        );
        Ok(body)
    }
}
