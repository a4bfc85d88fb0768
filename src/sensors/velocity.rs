//! Windowed shaft velocity from the quadrature position counter.
//!
//! Each telemetry period the estimator reads the counter, subtracts the
//! previous reading and scales the delta by the encoder resolution and the
//! elapsed time.  A negative delta is reverse rotation and yields a
//! negative RPM.

use core::time::Duration;

use crate::app::ports::PulseCounter;
use crate::error::EncoderError;

/// One velocity measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
    /// Counter value at the end of the window.
    pub count: i32,
    /// Counts accumulated in the window (signed).
    pub count_delta: i32,
    /// Window length.
    pub elapsed: Duration,
    /// Shaft revolutions in the window (signed).
    pub revolutions: f32,
    /// Shaft speed (signed).
    pub rpm: f32,
}

/// Compute a velocity sample from two counter readings.
///
/// A zero-length window or a zero encoder resolution reports 0 RPM rather
/// than dividing by zero.
pub fn sample(
    reading: i32,
    previous: i32,
    elapsed: Duration,
    pulses_per_revolution: u32,
) -> VelocitySample {
    let count_delta = reading.wrapping_sub(previous);

    let revolutions = if pulses_per_revolution > 0 {
        count_delta as f32 / pulses_per_revolution as f32
    } else {
        0.0
    };

    let secs = elapsed.as_secs_f32();
    let rpm = if secs > 0.0 {
        revolutions / secs * 60.0
    } else {
        0.0
    };

    VelocitySample {
        count: reading,
        count_delta,
        elapsed,
        revolutions,
        rpm,
    }
}

/// Owns the position counter and remembers the previous reading.
pub struct VelocityEstimator<C: PulseCounter> {
    counter: C,
    previous: i32,
    pulses_per_revolution: u32,
}

impl<C: PulseCounter> VelocityEstimator<C> {
    pub fn new(counter: C, pulses_per_revolution: u32) -> Self {
        Self {
            counter,
            previous: 0,
            pulses_per_revolution,
        }
    }

    /// Read the counter and compute the velocity over `elapsed`.
    pub fn sample(&mut self, elapsed: Duration) -> Result<VelocitySample, EncoderError> {
        let reading = self.counter.count()?;
        let s = sample(reading, self.previous, elapsed, self.pulses_per_revolution);
        self.previous = reading;
        Ok(s)
    }

    /// Zero the counter and the remembered reading.
    pub fn reset(&mut self) -> Result<(), EncoderError> {
        self.counter.clear()?;
        self.previous = 0;
        Ok(())
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }
}
