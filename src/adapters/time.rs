//! ESP32 time adapter.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.
//!
//! [`StdDelay`] is the blocking delay used for task periods, the supervisor
//! settle delay and bring-up retries.  On ESP-IDF `std::thread::sleep` maps
//! to `vTaskDelay`, so the calling task yields the core.

use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::app::ports::TimePort;

/// Time adapter for the ESP32-S3 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl TimePort for Esp32TimeAdapter {
    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    fn uptime_us(&self) -> u64 {
        // SAFETY: reads the free-running system timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since adapter creation (monotonic).
    #[cfg(not(target_os = "espidf"))]
    fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Blocking delay that yields the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
