//! Outbound node events.
//!
//! The command, telemetry and supervisor tasks emit these through the
//! [`EventSink`](super::ports::EventSink) port.

use crate::can::frame::{MotorCommand, NodeAddress};
use crate::can::supervisor::BusHealth;
use crate::error::{ActuatorError, EncoderError, TransportError};
use crate::sensors::velocity::VelocitySample;

/// Structured events emitted by the node tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Bring-up finished; the tasks are running.
    Started(NodeAddress),

    /// A received command was applied to the motor.
    CommandApplied { command: MotorCommand, duty: u16 },

    /// A received frame was discarded.
    FrameDropped(TransportError),

    /// The actuator refused a command.
    ActuatorFault(ActuatorError),

    /// Periodic velocity report.
    Velocity(VelocitySample),

    /// The pulse counter could not be read.
    EncoderFault(EncoderError),

    /// The polled bus health changed.
    HealthChanged { from: BusHealth, to: BusHealth },

    /// The driver was restarted successfully after `attempts` tries.
    Recovered { attempts: u32 },

    /// A driver restart attempt failed; it is retried on the next poll.
    RecoveryFailed { error: TransportError, attempts: u32 },
}
