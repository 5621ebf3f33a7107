//! Smoke sensing: the debounce filter and the monitor that drives it.
//!
//! [`smoke::SensorMonitor`] owns the input line on a worker thread and
//! reports debounced level changes to a [`SmokeObserver`](crate::app::ports::SmokeObserver).

pub mod debounce;
pub mod smoke;
