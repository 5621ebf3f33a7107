//! Camera capture and remote fire detection.

pub mod capture;
pub mod detection;
