//! Smokewatch appliance library.
//!
//! Smoke-contact monitoring, alarm control, camera capture with remote
//! fire detection, and status broadcasting.  Hardware and network access
//! go through the port traits in [`app::ports`]; the host binary wires
//! them to the adapters in [`adapters`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fsm;
pub mod sensors;
pub mod vision;

mod pins;
