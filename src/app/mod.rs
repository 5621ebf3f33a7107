//! Application core: domain types, ports and the assembled appliance.
//!
//! Everything that touches hardware or the network does so through the
//! **port traits** in [`ports`]; [`service::Appliance`] wires the
//! components together from those ports, so the whole appliance runs
//! against mock adapters in tests.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
