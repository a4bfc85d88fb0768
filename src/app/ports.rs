//! Port traits — the hexagonal boundary between the node core and hardware.
//!
//! ```text
//!   Adapter / driver ──▶ Port trait ──▶ Transport · Supervisor · Tasks
//! ```
//!
//! PWM duty, direction level and blocking delays are not redefined here:
//! the core consumes the `embedded-hal` 1.0 traits
//! ([`SetDutyCycle`](embedded_hal::pwm::SetDutyCycle),
//! [`OutputPin`](embedded_hal::digital::OutputPin),
//! [`DelayNs`](embedded_hal::delay::DelayNs)) for those.

use core::time::Duration;

use crate::can::filter::AcceptanceFilter;
use crate::can::frame::Frame;
use crate::error::{EncoderError, MediumError};

// ───────────────────────────────────────────────────────────────
// CAN medium (driven adapter: node ↔ shared bus)
// ───────────────────────────────────────────────────────────────

/// Controller state as reported by the bus driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumState {
    /// Not installed, or installed but not started.
    Stopped,
    /// Participating in bus traffic.
    Running,
    /// Hardware is counting recovery sequences after bus-off.
    Recovering,
    /// Electrically excluded from the bus after excessive errors.
    BusOff,
}

/// The shared-bus driver (TWAI on the ESP32-S3, a virtual bus on host).
///
/// All methods take `&self`: the underlying driver is internally
/// synchronised, so the command task and the supervisor may call into it
/// from different threads.  Lifecycle: `install → start → … → stop →
/// uninstall`.
pub trait CanMedium: Send + Sync {
    /// Install the driver with the given hardware acceptance filter.
    fn install(&self, filter: &AcceptanceFilter) -> Result<(), MediumError>;

    /// Start bus participation.
    fn start(&self) -> Result<(), MediumError>;

    /// Stop bus participation.  Fails with `InvalidState` if not running.
    fn stop(&self) -> Result<(), MediumError>;

    /// Release driver resources.  Fails with `InvalidState` if not installed
    /// or still running.
    fn uninstall(&self) -> Result<(), MediumError>;

    /// Queue one frame, waiting up to `timeout` for a free TX slot.
    fn transmit(&self, frame: &Frame, timeout: Duration) -> Result<(), MediumError>;

    /// Wait up to `timeout` for the next frame that passed the filter.
    fn receive(&self, timeout: Duration) -> Result<Frame, MediumError>;

    /// Current controller state.  Pure observation.
    fn state(&self) -> MediumState;
}

// ───────────────────────────────────────────────────────────────
// Position counter (driven adapter: quadrature decoder → node)
// ───────────────────────────────────────────────────────────────

/// Hardware pulse counter fed by quadrature edges.
///
/// Written only by the peripheral (or its ISR); the telemetry task is the
/// sole reader.  Reads are a single word, so no lock is required.
pub trait PulseCounter {
    /// Current signed count.
    fn count(&self) -> Result<i32, EncoderError>;

    /// Zero the counter.
    fn clear(&mut self) -> Result<(), EncoderError>;
}

// ───────────────────────────────────────────────────────────────
// Monotonic time
// ───────────────────────────────────────────────────────────────

pub trait TimePort {
    /// Microseconds since boot (monotonic).
    fn uptime_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: node → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The tasks emit structured [`NodeEvent`](super::events::NodeEvent)s
/// through this port.  Adapters decide where they go (serial log, event
/// channel, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::NodeEvent);
}
