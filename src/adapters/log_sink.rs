//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured node events to the
//! ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::NodeEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`NodeEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent) {
        match event {
            NodeEvent::Started(address) => {
                info!("START | node={} | tasks running", address);
            }
            NodeEvent::CommandApplied { command, duty } => {
                info!(
                    "CMD   | speed={}% dir={:?} duty={}",
                    command.speed, command.direction, duty
                );
            }
            NodeEvent::FrameDropped(e) => {
                warn!("CMD   | frame dropped: {}", e);
            }
            NodeEvent::ActuatorFault(e) => {
                warn!("CMD   | actuator fault: {}", e);
            }
            NodeEvent::Velocity(s) => {
                info!(
                    "TELEM | count={} delta={} rev={:.3} rpm={:.2}",
                    s.count, s.count_delta, s.revolutions, s.rpm
                );
            }
            NodeEvent::EncoderFault(e) => {
                warn!("TELEM | encoder fault: {}", e);
            }
            NodeEvent::HealthChanged { from, to } => {
                info!("BUS   | {:?} -> {:?}", from, to);
            }
            NodeEvent::Recovered { attempts } => {
                info!("BUS   | recovered after {} attempt(s)", attempts);
            }
            NodeEvent::RecoveryFailed { error, attempts } => {
                warn!("BUS   | recovery attempt {} failed: {}", attempts, error);
            }
        }
    }
}
