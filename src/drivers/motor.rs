//! DC motor actuator (H-bridge with PWM speed and a direction input).
//!
//! Speed percent maps linearly onto the PWM duty range:
//! `duty = speed * max_duty / 100` (integer division, so 50 % on a 10-bit
//! timer is 511).  Every apply writes the duty first and the direction
//! level second.
//!
//! The driver is generic over the `embedded-hal` output traits; the
//! firmware plugs in [`LedcPwm`](super::hw_init::LedcPwm) and
//! [`DirectionPin`](super::hw_init::DirectionPin), tests plug in recorders.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, error};

use crate::can::frame::{Direction, MotorCommand, MAX_SPEED};
use crate::error::ActuatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Stopped,
    Running { duty: u16, direction: Direction },
}

pub struct MotorDriver<P: SetDutyCycle, D: OutputPin> {
    pwm: P,
    dir: D,
    state: MotorState,
}

/// Duty value for `speed` percent on a PWM with `max_duty` full scale.
/// Speeds above 100 are clamped first.
pub fn duty_for(speed: u8, max_duty: u16) -> u16 {
    let speed = u32::from(speed.min(MAX_SPEED));
    (speed * u32::from(max_duty) / u32::from(MAX_SPEED)) as u16
}

impl<P: SetDutyCycle, D: OutputPin> MotorDriver<P, D> {
    /// Take ownership of the outputs and drive them to the idle state
    /// (0 % duty, direction low).
    pub fn init(mut pwm: P, mut dir: D) -> Result<Self, ActuatorError> {
        pwm.set_duty_cycle(0).map_err(|e| {
            error!("Motor: initial duty write failed: {:?}", e);
            ActuatorError::ConfigFailed
        })?;
        dir.set_low().map_err(|e| {
            error!("Motor: initial direction write failed: {:?}", e);
            ActuatorError::ConfigFailed
        })?;
        Ok(Self {
            pwm,
            dir,
            state: MotorState::Stopped,
        })
    }

    /// Drive the motor at `cmd.speed` percent in `cmd.direction`.
    ///
    /// Returns the duty written.  If the duty write fails the direction is
    /// left untouched; if the direction write fails the new duty stays
    /// applied.
    pub fn apply(&mut self, cmd: MotorCommand) -> Result<u16, ActuatorError> {
        let cmd = cmd.clamped();
        let duty = duty_for(cmd.speed, self.pwm.max_duty_cycle());

        self.pwm.set_duty_cycle(duty).map_err(|e| {
            error!("Motor: duty write failed: {:?}", e);
            ActuatorError::PwmWriteFailed
        })?;

        let level = match cmd.direction {
            Direction::Forward => self.dir.set_low(),
            Direction::Reverse => self.dir.set_high(),
        };
        level.map_err(|e| {
            error!("Motor: direction write failed: {:?}", e);
            ActuatorError::GpioWriteFailed
        })?;

        self.state = if duty == 0 {
            MotorState::Stopped
        } else {
            MotorState::Running {
                duty,
                direction: cmd.direction,
            }
        };
        debug!(
            "Motor: speed={}% dir={:?} duty={}",
            cmd.speed, cmd.direction, duty
        );
        Ok(duty)
    }

    /// Zero the duty.  The direction level is left as is.
    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        self.pwm
            .set_duty_cycle(0)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.state = MotorState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, MotorState::Stopped)
    }

    pub fn max_duty(&self) -> u16 {
        self.pwm.max_duty_cycle()
    }

    pub fn outputs(&self) -> (&P, &D) {
        (&self.pwm, &self.dir)
    }
}
