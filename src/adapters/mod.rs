//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements                         | Connects to               |
//! |-----------------|------------------------------------|---------------------------|
//! | `gpio`          | InputLineProvider                  | Smoke contact (gpiochip)  |
//! |                 | OutputLineProvider                 | Sounder line (gpiochip)   |
//! | `http_detector` | DetectorTransport                  | Detection service (HTTP)  |
//! | `json_config`   | ConfigPort                         | JSON file on disk         |
//! | `log_sink`      | PublishSink                        | Log output                |
//! | `sim`           | InputLineProvider                  | Simulated smoke contact   |
//! |                 | OutputLineProvider                 | Simulated sounder line    |
//! |                 | CameraDevice                       | Synthetic frame source    |
//! | `time`          | (none)                             | Wall and monotonic clocks |

pub mod gpio;
pub mod http_detector;
pub mod json_config;
pub mod log_sink;
pub mod sim;
pub mod time;
