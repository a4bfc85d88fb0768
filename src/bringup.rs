//! Retry-until-ready bring-up.
//!
//! Peripherals that fail to initialise at boot (bus not yet terminated,
//! driver still held by a previous run) are retried at a fixed interval
//! instead of aborting the firmware.

use core::fmt::Display;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

/// Run `op` until it succeeds, waiting `interval_ms` between attempts.
///
/// With `max_attempts = None` this only returns once `op` succeeds.  With
/// `Some(n)` the error of the `n`-th failed attempt is returned.
pub fn retry<T, E: Display>(
    label: &str,
    delay: &mut impl DelayNs,
    interval_ms: u32,
    max_attempts: Option<u32>,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    info!("{}: ready after {} attempts", label, attempt);
                } else {
                    info!("{}: ready", label);
                }
                return Ok(value);
            }
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    error!("{}: giving up after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
                warn!(
                    "{}: attempt {} failed: {}, retrying in {} ms",
                    label, attempt, e, interval_ms
                );
                delay.delay_ms(interval_ms);
            }
        }
    }
}
