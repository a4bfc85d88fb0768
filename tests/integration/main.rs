//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters and the in-process virtual CAN bus.  All tests run
//! on the host (x86_64) with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod encoder_tests;
mod node_flow_tests;
mod supervisor_tests;
