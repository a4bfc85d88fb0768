//! Application boundary — port traits and outbound node events.
//!
//! The CAN transport, fault supervisor, actuator and velocity estimator
//! only touch hardware through the **port traits** defined in [`ports`]
//! (plus the `embedded-hal` PWM / GPIO / delay traits), keeping the node's
//! control loop fully testable without real peripherals.

pub mod events;
pub mod ports;
