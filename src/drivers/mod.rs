//! Peripheral drivers, the motor actuator, and task spawning helpers.

pub mod hw_init;
pub mod motor;
pub mod task_pin;
#[cfg(target_os = "espidf")]
pub mod twai;
