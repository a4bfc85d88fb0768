//! Bus fault supervisor.
//!
//! Polls the medium every supervisor tick and restarts the driver when the
//! node has been excluded from the bus.
//!
//! ## Recovery lifecycle
//!
//! 1. `Active`: each tick polls [`Transport::health`].
//! 2. A `Faulted` poll moves the supervisor to `Recovering` and the
//!    restart runs inline: close, settle delay, reopen.
//! 3. A successful reopen returns to `Active`.
//! 4. A failed reopen stays in `Recovering`; the next tick repeats step 2
//!    without polling.  Recovery never gives up.
//!
//! Bus-off is only detectable by polling on this hardware, so the poll
//! period is the fault-detection latency.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use super::transport::{Transport, TransportCell};
use crate::app::ports::{CanMedium, MediumState};
use crate::error::TransportError;

/// Why the bus is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Excluded from the bus after excessive errors.
    BusOff,
    /// Driver not running although nobody asked it to stop.
    Stopped,
}

/// Bus state as observed by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusHealth {
    Active,
    Recovering,
    Faulted(Fault),
}

impl BusHealth {
    pub fn from_medium(state: MediumState) -> Self {
        match state {
            MediumState::Running => Self::Active,
            MediumState::Recovering => Self::Recovering,
            MediumState::BusOff => Self::Faulted(Fault::BusOff),
            MediumState::Stopped => Self::Faulted(Fault::Stopped),
        }
    }

    pub fn is_faulted(self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Active,
    Recovering,
}

/// Result of one supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Polled; no restart needed.
    Healthy(BusHealth),
    /// The driver was restarted.  `attempts` counts tries in this episode.
    Recovered { attempts: u32 },
    /// The restart failed; the supervisor remains `Recovering`.
    RecoveryFailed { error: TransportError, attempts: u32 },
}

pub struct FaultSupervisor<D: DelayNs> {
    state: SupervisorState,
    delay: D,
    settle_delay_ms: u32,
    /// Failed reopen attempts in the current episode.
    attempts: u32,
    /// Fault that started the current (or most recent) episode.
    last_fault: Option<Fault>,
    /// Successful restarts since boot.
    recoveries: u32,
}

impl<D: DelayNs> FaultSupervisor<D> {
    pub fn new(delay: D, settle_delay_ms: u32) -> Self {
        Self {
            state: SupervisorState::Active,
            delay,
            settle_delay_ms,
            attempts: 0,
            last_fault: None,
            recoveries: 0,
        }
    }

    /// Read the medium status.  No side effects.
    pub fn poll<M: CanMedium>(&self, transport: &Transport<M>) -> BusHealth {
        transport.health()
    }

    /// Stop and release the driver, wait for the bus to settle, then open
    /// it again on the same address.
    pub fn recover<M: CanMedium>(
        &mut self,
        transport: &mut Transport<M>,
    ) -> Result<(), TransportError> {
        info!("CAN: restarting driver on {}", transport.address());
        transport.close();
        self.delay.delay_ms(self.settle_delay_ms);
        transport.open()
    }

    /// One supervisor period: poll, and restart inline if needed.
    ///
    /// Health is read under a shared guard; the restart holds the
    /// exclusive guard so the command task cannot use the transport while
    /// it is being replaced.
    pub fn tick<M: CanMedium>(&mut self, cell: &TransportCell<M>) -> TickOutcome {
        if self.state == SupervisorState::Active {
            let health = {
                let transport = cell.read();
                self.poll(&*transport)
            };
            let BusHealth::Faulted(fault) = health else {
                return TickOutcome::Healthy(health);
            };
            warn!("CAN: {:?} detected, restarting driver", health);
            self.state = SupervisorState::Recovering;
            self.attempts = 0;
            self.last_fault = Some(fault);
        }

        self.attempts += 1;
        let result = {
            let mut transport = cell.write();
            self.recover(&mut *transport)
        };

        match result {
            Ok(()) => {
                let attempts = self.attempts;
                self.state = SupervisorState::Active;
                self.attempts = 0;
                self.recoveries += 1;
                info!("CAN: driver recovered after {} attempt(s)", attempts);
                TickOutcome::Recovered { attempts }
            }
            Err(error) => {
                error!(
                    "CAN: recovery attempt {} failed: {}",
                    self.attempts, error
                );
                TickOutcome::RecoveryFailed {
                    error,
                    attempts: self.attempts,
                }
            }
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn last_fault(&self) -> Option<Fault> {
        self.last_fault
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }
}
