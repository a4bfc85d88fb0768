//! Quadrature encoder position counter.
//!
//! Channel A edges are counted; the level of channel B picks the sign:
//!
//! | A edge  | B low | B high |
//! |---------|-------|--------|
//! | rising  | +1    | −1     |
//! | falling | −1    | +1     |
//!
//! Reaching either counter limit resets the count to zero, as the PCNT
//! peripheral does on overflow.
//!
//! - **`target_os = "espidf"`**: [`PcntEncoder`] programs a PCNT unit with
//!   exactly that edge/level table; counting happens in hardware.
//! - **all other targets**: [`QuadratureCounter`] applies the same rule in
//!   software.  Edges are fed through an [`EdgeInput`] handle, the host
//!   stand-in for the GPIO interrupt.

use core::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::app::ports::PulseCounter;
use crate::can::frame::Direction;
use crate::error::EncoderError;

// ── Software decoder ──────────────────────────────────────────

struct CounterState {
    count: AtomicI32,
    low_limit: i32,
    high_limit: i32,
}

impl CounterState {
    fn step(&self, delta: i32) {
        // Single writer (the edge source); the update closure never fails.
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                let next = c.saturating_add(delta);
                Some(if next >= self.high_limit || next <= self.low_limit {
                    0
                } else {
                    next
                })
            });
    }
}

/// Software quadrature counter with an atomic count.
pub struct QuadratureCounter {
    state: Arc<CounterState>,
}

/// Edge source for a [`QuadratureCounter`] (the ISR side).
#[derive(Clone)]
pub struct EdgeInput {
    state: Arc<CounterState>,
}

impl QuadratureCounter {
    pub fn new(low_limit: i32, high_limit: i32) -> Self {
        Self {
            state: Arc::new(CounterState {
                count: AtomicI32::new(0),
                low_limit,
                high_limit,
            }),
        }
    }

    /// Handle for feeding channel edges into this counter.
    pub fn edge_input(&self) -> EdgeInput {
        EdgeInput {
            state: Arc::clone(&self.state),
        }
    }
}

impl PulseCounter for QuadratureCounter {
    fn count(&self) -> Result<i32, EncoderError> {
        Ok(self.state.count.load(Ordering::Acquire))
    }

    fn clear(&mut self) -> Result<(), EncoderError> {
        self.state.count.store(0, Ordering::Release);
        Ok(())
    }
}

impl EdgeInput {
    /// One edge on channel A, with channel B at `b_high`.
    pub fn on_a_edge(&self, rising: bool, b_high: bool) {
        let delta = if rising { 1 } else { -1 };
        self.state.step(if b_high { -delta } else { delta });
    }

    /// A full channel-A period (rising then falling) with B in the phase
    /// relation the given shaft direction produces.  Counts ±2.
    pub fn pulse(&self, direction: Direction) {
        match direction {
            Direction::Forward => {
                self.on_a_edge(true, false);
                self.on_a_edge(false, true);
            }
            Direction::Reverse => {
                self.on_a_edge(true, true);
                self.on_a_edge(false, false);
            }
        }
    }
}

// ── PCNT peripheral ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use pcnt::PcntEncoder;

#[cfg(target_os = "espidf")]
mod pcnt {
    use esp_idf_svc::sys::*;
    use log::info;

    use crate::app::ports::PulseCounter;
    use crate::error::EncoderError;

    /// Hardware quadrature counter on a PCNT unit.
    pub struct PcntEncoder {
        unit: pcnt_unit_handle_t,
        channel: pcnt_channel_handle_t,
    }

    // SAFETY: the PCNT driver serialises access per unit internally; the
    // handles are only used by the task that owns this encoder.
    unsafe impl Send for PcntEncoder {}

    fn check(rc: esp_err_t) -> Result<(), esp_err_t> {
        if rc == ESP_OK as esp_err_t { Ok(()) } else { Err(rc) }
    }

    impl PcntEncoder {
        /// Allocate a PCNT unit, wire A as the edge input and B as the level
        /// input, and start counting from zero.  Partially created resources
        /// are released on failure so the call can simply be retried.
        pub fn new(
            gpio_a: i32,
            gpio_b: i32,
            low_limit: i32,
            high_limit: i32,
        ) -> Result<Self, EncoderError> {
            let unit_config = pcnt_unit_config_t {
                low_limit,
                high_limit,
                ..Default::default()
            };
            let mut unit: pcnt_unit_handle_t = core::ptr::null_mut();
            // SAFETY: config and out-pointer are valid for the call.
            check(unsafe { pcnt_new_unit(&unit_config, &mut unit) })
                .map_err(EncoderError::InitFailed)?;

            let chan_config = pcnt_chan_config_t {
                edge_gpio_num: gpio_a,
                level_gpio_num: gpio_b,
                ..Default::default()
            };
            let mut channel: pcnt_channel_handle_t = core::ptr::null_mut();
            // SAFETY: `unit` was created above.
            if let Err(rc) = check(unsafe { pcnt_new_channel(unit, &chan_config, &mut channel) }) {
                unsafe { pcnt_del_unit(unit) };
                return Err(EncoderError::InitFailed(rc));
            }

            let encoder = Self { unit, channel };
            if let Err(rc) = encoder.configure() {
                encoder.release();
                return Err(EncoderError::InitFailed(rc));
            }

            info!("Encoder initialized on GPIOA={}, GPIOB={}", gpio_a, gpio_b);
            Ok(encoder)
        }

        fn configure(&self) -> Result<(), esp_err_t> {
            // SAFETY: handles are valid until `release`.
            unsafe {
                check(pcnt_channel_set_edge_action(
                    self.channel,
                    pcnt_channel_edge_action_t_PCNT_CHANNEL_EDGE_ACTION_INCREASE,
                    pcnt_channel_edge_action_t_PCNT_CHANNEL_EDGE_ACTION_DECREASE,
                ))?;
                check(pcnt_channel_set_level_action(
                    self.channel,
                    pcnt_channel_level_action_t_PCNT_CHANNEL_LEVEL_ACTION_KEEP,
                    pcnt_channel_level_action_t_PCNT_CHANNEL_LEVEL_ACTION_INVERSE,
                ))?;
                check(pcnt_unit_enable(self.unit))?;
                check(pcnt_unit_clear_count(self.unit))?;
                check(pcnt_unit_start(self.unit))?;
            }
            Ok(())
        }

        fn release(self) {
            // SAFETY: best-effort teardown of handles created in `new`.
            unsafe {
                pcnt_unit_stop(self.unit);
                pcnt_unit_disable(self.unit);
                pcnt_del_channel(self.channel);
                pcnt_del_unit(self.unit);
            }
        }
    }

    impl PulseCounter for PcntEncoder {
        fn count(&self) -> Result<i32, EncoderError> {
            let mut count: i32 = 0;
            // SAFETY: unit handle is valid for the encoder's lifetime.
            check(unsafe { pcnt_unit_get_count(self.unit, &mut count) })
                .map_err(EncoderError::ReadFailed)?;
            Ok(count)
        }

        fn clear(&mut self) -> Result<(), EncoderError> {
            // SAFETY: unit handle is valid for the encoder's lifetime.
            check(unsafe { pcnt_unit_clear_count(self.unit) }).map_err(EncoderError::ReadFailed)
        }
    }
}
