//! MotorNode firmware library.
//!
//! Exposes the node core (CAN transport, fault supervisor, actuator,
//! velocity estimator, tasks) for integration testing and the firmware
//! binary. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; on the host the same
//! core runs against simulated peripherals and a virtual bus.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bringup;
pub mod can;
pub mod config;
pub mod drivers;
pub mod error;
pub mod node;
pub mod pins;
pub mod sensors;

mod esp_link_shims;
