//! GPIO / peripheral pin assignments for the motor node board.
//!
//! Single source of truth — [`NodeConfig::default`](crate::config::NodeConfig)
//! and every driver reference this module rather than hard-coding pin
//! numbers.

// ---------------------------------------------------------------------------
// CAN (TWAI) transceiver
// ---------------------------------------------------------------------------

pub const CAN_TX_GPIO: i32 = 43;
pub const CAN_RX_GPIO: i32 = 44;

// ---------------------------------------------------------------------------
// Motor driver (PWM + direction)
// ---------------------------------------------------------------------------

/// LEDC PWM output for motor speed.
pub const MOTOR_PWM_GPIO: i32 = 12;
/// Digital output: HIGH = reverse, LOW = forward.
pub const MOTOR_DIR_GPIO: i32 = 11;

// ---------------------------------------------------------------------------
// Quadrature encoder (PCNT)
// ---------------------------------------------------------------------------

/// Channel A: counted edges.
pub const ENCODER_A_GPIO: i32 = 4;
/// Channel B: level selects count direction.
pub const ENCODER_B_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  10-bit gives 0 – 1023 duty levels.
pub const MOTOR_PWM_RESOLUTION_BITS: u32 = 10;
/// LEDC base frequency for the motor (20 kHz — inaudible).
pub const MOTOR_PWM_FREQ_HZ: u32 = 20_000;
