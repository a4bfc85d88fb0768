//! Node configuration parameters
//!
//! Supplied once at startup and immutable afterwards.  The firmware uses
//! [`NodeConfig::default`] unless a JSON override is baked in at build time
//! (see `main.rs`), which is how several boards get distinct addresses.

use serde::{Deserialize, Serialize};

use crate::can::frame::MAX_NODE_ADDRESS;
use crate::error::ConfigError;
use crate::pins;

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // --- CAN ---
    /// This node's 11-bit receive address
    pub node_address: u16,
    /// Bus bitrate (kbit/s)
    pub can_bitrate_kbps: u32,
    pub can_tx_gpio: i32,
    pub can_rx_gpio: i32,
    /// Receive wait per command-task iteration (milliseconds)
    pub rx_timeout_ms: u32,
    /// Transmit wait for a free TX slot (milliseconds)
    pub tx_timeout_ms: u32,

    // --- Motor ---
    pub pwm_gpio: i32,
    pub dir_gpio: i32,
    /// PWM frequency (Hz)
    pub pwm_freq_hz: u32,
    /// PWM resolution (bits)
    pub pwm_resolution_bits: u32,

    // --- Encoder ---
    pub encoder_a_gpio: i32,
    pub encoder_b_gpio: i32,
    /// Encoder pulses per shaft revolution
    pub pulses_per_revolution: u32,
    /// Pulse counter low limit (count resets to 0 on reaching it)
    pub counter_low_limit: i32,
    /// Pulse counter high limit (count resets to 0 on reaching it)
    pub counter_high_limit: i32,

    // --- Timing ---
    /// Velocity sampling period (milliseconds)
    pub telemetry_period_ms: u32,
    /// Bus health polling period (milliseconds)
    pub supervisor_period_ms: u32,
    /// Wait between driver teardown and re-init (milliseconds)
    pub settle_delay_ms: u32,
    /// Wait between failed bring-up attempts (milliseconds)
    pub init_retry_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // CAN
            node_address: 0x121,
            can_bitrate_kbps: 500,
            can_tx_gpio: pins::CAN_TX_GPIO,
            can_rx_gpio: pins::CAN_RX_GPIO,
            rx_timeout_ms: 1000,
            tx_timeout_ms: 1000,

            // Motor
            pwm_gpio: pins::MOTOR_PWM_GPIO,
            dir_gpio: pins::MOTOR_DIR_GPIO,
            pwm_freq_hz: pins::MOTOR_PWM_FREQ_HZ,
            pwm_resolution_bits: pins::MOTOR_PWM_RESOLUTION_BITS,

            // Encoder
            encoder_a_gpio: pins::ENCODER_A_GPIO,
            encoder_b_gpio: pins::ENCODER_B_GPIO,
            pulses_per_revolution: 600,
            counter_low_limit: i16::MIN as i32,
            counter_high_limit: i16::MAX as i32,

            // Timing
            telemetry_period_ms: 500,  // 2 Hz
            supervisor_period_ms: 500, // 2 Hz
            settle_delay_ms: 100,
            init_retry_ms: 1000,
        }
    }
}

impl NodeConfig {
    /// Parse a JSON document (missing fields take their defaults) and
    /// validate the result.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_address > MAX_NODE_ADDRESS {
            return Err(ConfigError::ValidationFailed("node_address exceeds 11 bits"));
        }
        if !matches!(self.can_bitrate_kbps, 125 | 250 | 500 | 1000) {
            return Err(ConfigError::ValidationFailed(
                "can_bitrate_kbps must be 125, 250, 500 or 1000",
            ));
        }
        if self.pulses_per_revolution == 0 {
            return Err(ConfigError::ValidationFailed("pulses_per_revolution must be > 0"));
        }
        if !(1..=14).contains(&self.pwm_resolution_bits) {
            return Err(ConfigError::ValidationFailed("pwm_resolution_bits must be 1..=14"));
        }
        if self.pwm_freq_hz == 0 {
            return Err(ConfigError::ValidationFailed("pwm_freq_hz must be > 0"));
        }
        if self.counter_low_limit >= 0 || self.counter_high_limit <= 0 {
            return Err(ConfigError::ValidationFailed("counter limits must straddle zero"));
        }
        if self.rx_timeout_ms == 0
            || self.tx_timeout_ms == 0
            || self.telemetry_period_ms == 0
            || self.supervisor_period_ms == 0
            || self.init_retry_ms == 0
        {
            return Err(ConfigError::ValidationFailed("periods and timeouts must be > 0"));
        }
        Ok(())
    }

    /// Highest duty value for the configured PWM resolution.
    pub fn max_duty(&self) -> u16 {
        ((1u32 << self.pwm_resolution_bits) - 1) as u16
    }
}
