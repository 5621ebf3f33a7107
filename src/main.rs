//! SmokeWatch host binary.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GpioInputProvider  GpioOutputProvider  SimCamera              │
//! │  (smoke contact)    (sounder line)      (frame source)         │
//! │  HttpDetector       LogPublishSink      JsonFileConfig         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Appliance                                             │    │
//! │  │  SensorMonitor · AlarmCoordinator · CapturePipeline    │    │
//! │  │  StatusBroadcaster                                     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `smokewatch [config.json]`.  Each stdin line is one JSON
//! command (see [`AppCommand`]); the reply is printed as one JSON line.
//! Lines come from the GPIO character device unless the config selects
//! `"line_driver": "simulated"`; then the console also accepts
//! `{"event":"sim_smoke","data":true}` to flip the simulated smoke
//! contact.  Closing stdin shuts the appliance down.
#![deny(unused_must_use)]

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use smokewatch::adapters::gpio::{GpioInputProvider, GpioOutputProvider, GpioSettings};
use smokewatch::adapters::http_detector::HttpDetector;
use smokewatch::adapters::json_config::JsonFileConfig;
use smokewatch::adapters::log_sink::LogPublishSink;
use smokewatch::adapters::sim::{SimCamera, SimCameraControl, SimInputProvider, SimLine, SimOutputProvider};
use smokewatch::app::commands::AppCommand;
use smokewatch::app::ports::ConfigPort;
use smokewatch::app::service::{Appliance, Hardware};
use smokewatch::config::LineDriver;

/// Default config location when no path argument is given.
const DEFAULT_CONFIG_PATH: &str = "smokewatch.json";

/// Frame period of the simulated camera (~30 fps).
const SIM_FRAME_PERIOD: Duration = Duration::from_millis(33);

/// Console-only inputs that steer the simulated hardware.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum SimInput {
    SimSmoke(bool),
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("SmokeWatch v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Config ─────────────────────────────────────────────
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = JsonFileConfig::new(&path)
        .load()
        .with_context(|| format!("loading config from {path}"))?;

    // ── 3. Adapters ───────────────────────────────────────────
    let camera = SimCameraControl::new(SIM_FRAME_PERIOD);
    let detector = HttpDetector::new(config.detector_url.clone()).context("building detector client")?;

    // Simulated lines stay reachable from the console.
    let mut sim_lines: Option<(Arc<SimLine>, Arc<SimLine>)> = None;
    let hw = match config.line_driver {
        LineDriver::Cdev => {
            let gpio = GpioSettings::from_config(&config);
            Hardware {
                smoke_line: Box::new(GpioInputProvider::new(gpio.clone())),
                alarm_line: Box::new(GpioOutputProvider::new(gpio)),
                camera: Box::new(SimCamera::new(Arc::clone(&camera))),
            }
        }
        LineDriver::Simulated => {
            let (smoke, alarm) = sim_lines.insert((SimLine::new(false), SimLine::new(false)));
            Hardware {
                smoke_line: Box::new(SimInputProvider::new(Arc::clone(smoke))),
                alarm_line: Box::new(SimOutputProvider::new(Arc::clone(alarm))),
                camera: Box::new(SimCamera::new(Arc::clone(&camera))),
            }
        }
    };

    // ── 4. Start ──────────────────────────────────────────────
    let appliance = Appliance::new(config, hw, detector);
    appliance
        .start(Box::new(LogPublishSink::new()))
        .context("starting appliance")?;

    // ── 5. Console loop ───────────────────────────────────────
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(cmd) = serde_json::from_str::<AppCommand>(line) {
            let reply = appliance.handle_command(cmd);
            serde_json::to_writer(&mut stdout, &reply)?;
            writeln!(stdout)?;
            stdout.flush()?;
            continue;
        }
        match (serde_json::from_str::<SimInput>(line), &sim_lines) {
            (Ok(SimInput::SimSmoke(high)), Some((smoke, _))) => {
                info!("APP: simulated smoke contact -> {}", high);
                smoke.set_level(high);
            }
            (Ok(_), None) => warn!("APP: sim_smoke needs \"line_driver\": \"simulated\""),
            (Err(e), _) => warn!("APP: ignoring console line: {}", e),
        }
    }

    // ── 6. Shutdown ───────────────────────────────────────────
    info!("APP: stdin closed ({} frame(s) captured)", camera.reads());
    if let Some((_, alarm)) = &sim_lines {
        info!("APP: {} simulated alarm pulse(s)", alarm.rising_edges());
    }
    appliance.shutdown().context("shutting down")?;
    Ok(())
}
