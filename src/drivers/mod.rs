//! Output drivers and worker-thread plumbing.

pub mod actuator;
pub mod worker;
