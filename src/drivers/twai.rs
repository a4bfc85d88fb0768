//! ESP32-S3 TWAI (CAN 2.0) controller as a [`CanMedium`].
//!
//! Thin wrapper over the legacy `twai_*` driver API.  The driver keeps its
//! own locking, so every method takes `&self` and may be called from the
//! command task and the supervisor concurrently.
//!
//! Bus-off raises no callback here; it is only visible through
//! [`CanMedium::state`], which the fault supervisor polls.

use core::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_svc::sys::*;
use log::info;

use crate::app::ports::{CanMedium, MediumState};
use crate::can::filter::AcceptanceFilter;
use crate::can::frame::{Frame, NodeAddress};
use crate::error::MediumError;

/// TX and RX queue depth (frames).
const QUEUE_LEN: u32 = 5;

pub struct TwaiMedium {
    tx_gpio: i32,
    rx_gpio: i32,
    bitrate_kbps: u32,
}

impl TwaiMedium {
    pub fn new(tx_gpio: i32, rx_gpio: i32, bitrate_kbps: u32) -> Self {
        Self {
            tx_gpio,
            rx_gpio,
            bitrate_kbps,
        }
    }

    /// Bit timing for the supported bitrates (20 time quanta per bit,
    /// sample point at 80 %).
    fn timing(&self) -> Result<twai_timing_config_t, MediumError> {
        let quanta_resolution_hz = match self.bitrate_kbps {
            1000 => 20_000_000,
            500 => 10_000_000,
            250 => 5_000_000,
            125 => 2_500_000,
            _ => return Err(MediumError::Failed(ESP_ERR_INVALID_ARG as esp_err_t)),
        };
        Ok(twai_timing_config_t {
            quanta_resolution_hz,
            brp: 0,
            tseg_1: 15,
            tseg_2: 4,
            sjw: 3,
            triple_sampling: false,
            ..Default::default()
        })
    }
}

fn check(rc: esp_err_t) -> Result<(), MediumError> {
    if rc == ESP_OK as esp_err_t {
        Ok(())
    } else if rc == ESP_ERR_TIMEOUT as esp_err_t {
        Err(MediumError::Timeout)
    } else if rc == ESP_ERR_INVALID_STATE as esp_err_t {
        Err(MediumError::InvalidState)
    } else {
        Err(MediumError::Failed(rc))
    }
}

fn ticks(timeout: Duration) -> u32 {
    TickType::new_millis(timeout.as_millis() as u64).ticks()
}

impl CanMedium for TwaiMedium {
    fn install(&self, filter: &AcceptanceFilter) -> Result<(), MediumError> {
        let general = twai_general_config_t {
            mode: twai_mode_t_TWAI_MODE_NORMAL,
            tx_io: self.tx_gpio,
            rx_io: self.rx_gpio,
            clkout_io: -1,
            bus_off_io: -1,
            tx_queue_len: QUEUE_LEN,
            rx_queue_len: QUEUE_LEN,
            alerts_enabled: TWAI_ALERT_NONE,
            clkout_divider: 0,
            intr_flags: ESP_INTR_FLAG_LEVEL1 as i32,
            ..Default::default()
        };
        let timing = self.timing()?;
        let filter = twai_filter_config_t {
            acceptance_code: filter.code,
            acceptance_mask: filter.mask,
            single_filter: filter.single,
        };
        // SAFETY: all three configs outlive the call; the driver copies them.
        check(unsafe { twai_driver_install(&general, &timing, &filter) })?;
        info!(
            "TWAI installed (TX=GPIO{}, RX=GPIO{}, {} kbit/s)",
            self.tx_gpio, self.rx_gpio, self.bitrate_kbps
        );
        Ok(())
    }

    fn start(&self) -> Result<(), MediumError> {
        // SAFETY: driver API validates its own state.
        check(unsafe { twai_start() })
    }

    fn stop(&self) -> Result<(), MediumError> {
        // SAFETY: as above.
        check(unsafe { twai_stop() })
    }

    fn uninstall(&self) -> Result<(), MediumError> {
        // SAFETY: as above.
        check(unsafe { twai_driver_uninstall() })
    }

    fn transmit(&self, frame: &Frame, timeout: Duration) -> Result<(), MediumError> {
        let mut msg = twai_message_t {
            identifier: frame.id,
            data_length_code: frame.data.len() as u8,
            ..Default::default()
        };
        if frame.extended {
            msg.__bindgen_anon_1.flags = TWAI_MSG_FLAG_EXTD;
        }
        msg.data[..frame.data.len()].copy_from_slice(&frame.data);
        // SAFETY: `msg` is a fully initialised message; the driver copies it.
        check(unsafe { twai_transmit(&msg, ticks(timeout)) })
    }

    fn receive(&self, timeout: Duration) -> Result<Frame, MediumError> {
        let mut msg = twai_message_t::default();
        // SAFETY: `msg` is a valid out-pointer for the duration of the call.
        check(unsafe { twai_receive(&mut msg, ticks(timeout)) })?;

        // SAFETY: every variant of the flags union is a plain u32.
        let extended = unsafe { msg.__bindgen_anon_1.flags } & TWAI_MSG_FLAG_EXTD != 0;
        let len = usize::from(msg.data_length_code).min(msg.data.len());
        let payload = &msg.data[..len];
        let frame = if extended {
            Frame::new_extended(msg.identifier, payload)
        } else {
            Frame::new_standard(NodeAddress::from_raw_masked(msg.identifier), payload)
        };
        frame.ok_or(MediumError::Failed(ESP_ERR_INVALID_SIZE as esp_err_t))
    }

    fn state(&self) -> MediumState {
        let mut status = twai_status_info_t::default();
        // SAFETY: `status` is a valid out-pointer.
        if unsafe { twai_get_status_info(&mut status) } != ESP_OK as esp_err_t {
            // Not installed.
            return MediumState::Stopped;
        }
        #[allow(non_upper_case_globals)]
        match status.state {
            twai_state_t_TWAI_STATE_RUNNING => MediumState::Running,
            twai_state_t_TWAI_STATE_RECOVERING => MediumState::Recovering,
            twai_state_t_TWAI_STATE_BUS_OFF => MediumState::BusOff,
            _ => MediumState::Stopped,
        }
    }
}
