//! Motor output peripherals.
//!
//! Configures the LEDC timer/channel for the motor PWM and the direction
//! GPIO using raw ESP-IDF sys calls, and exposes both through the
//! `embedded-hal` 1.0 traits the motor driver consumes.
//!
//! - **`target_os = "espidf"`**: low-speed LEDC timer 0 / channel 0 and a
//!   push-pull GPIO output.
//! - **all other targets**: the same types keep the last written duty and
//!   level in memory so the actuator logic runs on the host.

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::info;

use crate::error::ActuatorError;

// ── Error types ───────────────────────────────────────────────

/// Errors while configuring a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcTimerFailed(i32),
    LedcChannelFailed(i32),
    /// Resolution outside what the LEDC timer supports.
    BadResolution(u32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc)  => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcTimerFailed(rc)   => write!(f, "LEDC timer config failed (rc={})", rc),
            Self::LedcChannelFailed(rc) => write!(f, "LEDC channel config failed (rc={})", rc),
            Self::BadResolution(bits)   => write!(f, "unsupported PWM resolution: {} bits", bits),
        }
    }
}

impl From<HwInitError> for ActuatorError {
    fn from(_: HwInitError) -> Self {
        ActuatorError::ConfigFailed
    }
}

/// A register write rejected by the driver, with the platform error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwError(pub i32);

impl pwm::Error for HwError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl digital::Error for HwError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

#[cfg(target_os = "espidf")]
fn check(rc: esp_err_t) -> Result<(), esp_err_t> {
    if rc == ESP_OK as esp_err_t { Ok(()) } else { Err(rc) }
}

// ── LEDC PWM ─────────────────────────────────────────────────

/// Motor PWM output on LEDC low-speed timer 0, channel 0.
pub struct LedcPwm {
    max_duty: u16,
    #[cfg(not(target_os = "espidf"))]
    duty: u16,
}

impl LedcPwm {
    /// Configure the timer at `freq_hz` with `resolution_bits` of duty
    /// resolution and bind channel 0 to `gpio`, starting at 0 % duty.
    pub fn new(gpio: i32, freq_hz: u32, resolution_bits: u32) -> Result<Self, HwInitError> {
        if !(1..=14).contains(&resolution_bits) {
            return Err(HwInitError::BadResolution(resolution_bits));
        }
        let max_duty = ((1u32 << resolution_bits) - 1) as u16;
        configure_ledc(gpio, freq_hz, resolution_bits)?;
        Ok(Self {
            max_duty,
            #[cfg(not(target_os = "espidf"))]
            duty: 0,
        })
    }

    /// Last duty written (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn duty(&self) -> u16 {
        self.duty
    }
}

#[cfg(target_os = "espidf")]
fn configure_ledc(gpio: i32, freq_hz: u32, resolution_bits: u32) -> Result<(), HwInitError> {
    let timer = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: resolution_bits as ledc_timer_bit_t,
        freq_hz,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    // SAFETY: config struct outlives the call; bring-up is single-threaded.
    check(unsafe { ledc_timer_config(&timer) }).map_err(HwInitError::LedcTimerFailed)?;

    let channel = ledc_channel_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        channel: ledc_channel_t_LEDC_CHANNEL_0,
        timer_sel: ledc_timer_t_LEDC_TIMER_0,
        gpio_num: gpio,
        duty: 0,
        hpoint: 0,
        ..Default::default()
    };
    // SAFETY: as above.
    check(unsafe { ledc_channel_config(&channel) }).map_err(HwInitError::LedcChannelFailed)?;

    info!("PWM initialized on GPIO{} ({} Hz, {}-bit)", gpio, freq_hz, resolution_bits);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn configure_ledc(gpio: i32, freq_hz: u32, resolution_bits: u32) -> Result<(), HwInitError> {
    log::debug!("PWM(sim) on GPIO{} ({} Hz, {}-bit)", gpio, freq_hz, resolution_bits);
    Ok(())
}

impl pwm::ErrorType for LedcPwm {
    type Error = HwError;
}

impl SetDutyCycle for LedcPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max_duty
    }

    #[cfg(target_os = "espidf")]
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HwError> {
        // SAFETY: channel 0 was configured in `new`; the command task is the
        // only writer.
        unsafe {
            check(ledc_set_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
                u32::from(duty),
            ))
            .map_err(HwError)?;
            check(ledc_update_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                ledc_channel_t_LEDC_CHANNEL_0,
            ))
            .map_err(HwError)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HwError> {
        self.duty = duty.min(self.max_duty);
        Ok(())
    }
}

// ── Direction GPIO ────────────────────────────────────────────

/// Push-pull output driving the H-bridge direction input.
pub struct DirectionPin {
    gpio: i32,
    #[cfg(not(target_os = "espidf"))]
    high: bool,
}

impl DirectionPin {
    /// Configure `gpio` as an output, driven low.
    pub fn new(gpio: i32) -> Result<Self, HwInitError> {
        configure_output(gpio)?;
        Ok(Self {
            gpio,
            #[cfg(not(target_os = "espidf"))]
            high: false,
        })
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Last level written (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn is_high(&self) -> bool {
        self.high
    }

    #[cfg(target_os = "espidf")]
    fn write(&mut self, high: bool) -> Result<(), HwError> {
        // SAFETY: pin configured as output in `new`; single writer.
        check(unsafe { gpio_set_level(self.gpio, u32::from(high)) }).map_err(HwError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&mut self, high: bool) -> Result<(), HwError> {
        self.high = high;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
fn configure_output(gpio: i32) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << gpio,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: config struct outlives the call; bring-up is single-threaded.
    check(unsafe { gpio_config(&cfg) }).map_err(HwInitError::GpioConfigFailed)?;
    check(unsafe { gpio_set_level(gpio, 0) }).map_err(HwInitError::GpioConfigFailed)?;
    info!("Direction output on GPIO{}", gpio);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn configure_output(_gpio: i32) -> Result<(), HwInitError> {
    Ok(())
}

impl digital::ErrorType for DirectionPin {
    type Error = HwError;
}

impl OutputPin for DirectionPin {
    fn set_low(&mut self) -> Result<(), HwError> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), HwError> {
        self.write(true)
    }
}
