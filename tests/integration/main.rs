//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the assembled board through
//! the real dispatcher against the simulated peripherals.  All tests run on
//! the host with no real hardware required.

mod mock_hw;
mod orchestrator_tests;
mod serial_tests;
mod traffic_tests;
