//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no real
//! hardware or detection service required.

mod alarm_tests;
mod appliance_tests;
mod broadcast_tests;
mod capture_tests;
mod mock_hw;
