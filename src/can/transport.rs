//! Addressed, filtered duplex channel over a [`CanMedium`].
//!
//! A [`Transport`] is the live handle to the bus: it owns the medium,
//! knows this node's address, and maps raw driver failures onto
//! [`TransportError`].  The command task and the fault supervisor share it
//! through a [`TransportCell`]; only the supervisor ever takes exclusive
//! access (to tear the driver down and bring it back).

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::filter::AcceptanceFilter;
use super::frame::{self, MotorCommand, NodeAddress};
use super::supervisor::BusHealth;
use crate::app::ports::CanMedium;
use crate::error::{MediumError, TransportError};

pub struct Transport<M: CanMedium> {
    medium: M,
    address: NodeAddress,
    filter: AcceptanceFilter,
    open: bool,
}

impl<M: CanMedium> Transport<M> {
    /// Bind a medium to this node's address.  The transport starts closed.
    pub fn new(medium: M, address: NodeAddress) -> Self {
        Self {
            medium,
            address,
            filter: AcceptanceFilter::exact(address),
            open: false,
        }
    }

    /// Install the driver with an exact-match filter on this node's address
    /// and start it.  A failed start uninstalls again so the next attempt
    /// begins from a clean slate.
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.open {
            return Ok(());
        }

        if let Err(e) = self.medium.install(&self.filter) {
            error!("CAN: driver install failed: {}", e);
            return Err(TransportError::DriverInit);
        }

        if let Err(e) = self.medium.start() {
            error!("CAN: driver start failed: {}", e);
            let _ = self.medium.uninstall();
            return Err(TransportError::DriverInit);
        }

        self.open = true;
        info!("CAN: driver started with filter ID={}", self.address);
        Ok(())
    }

    /// Stop and release the medium.  Safe to call on a stopped, bus-off or
    /// never-opened medium.
    pub fn close(&mut self) {
        if let Err(e) = self.medium.stop() {
            debug!("CAN: stop skipped ({})", e);
        }
        if let Err(e) = self.medium.uninstall() {
            debug!("CAN: uninstall skipped ({})", e);
        }
        if self.open {
            info!("CAN: driver stopped");
        }
        self.open = false;
    }

    /// Send `cmd` to `target`.  Speed is clamped before encoding.  No retry.
    pub fn send(
        &self,
        target: NodeAddress,
        cmd: MotorCommand,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotRunning);
        }

        let frame = frame::encode(target, cmd);
        match self.medium.transmit(&frame, timeout) {
            Ok(()) => {
                debug!(
                    "CAN: sent to ID={}: speed={}%, dir={:?}",
                    target,
                    frame.data[0],
                    cmd.direction
                );
                Ok(())
            }
            Err(MediumError::Timeout) => {
                warn!("CAN: transmit to {} timed out", target);
                Err(TransportError::Timeout)
            }
            Err(MediumError::InvalidState) => {
                warn!("CAN: transmit to {} refused, bus not running", target);
                Err(TransportError::NotRunning)
            }
            Err(e) => {
                warn!("CAN: transmit to {} rejected: {}", target, e);
                Err(TransportError::Busy)
            }
        }
    }

    /// Wait up to `timeout` for the next command addressed to this node.
    ///
    /// Frames that slip past the hardware filter are discarded here and the
    /// wait continues within the same budget.
    pub fn receive(&self, timeout: Duration) -> Result<MotorCommand, TransportError> {
        if !self.open {
            return Err(TransportError::NotRunning);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = match self.medium.receive(remaining) {
                Ok(frame) => frame,
                Err(MediumError::Timeout) => return Err(TransportError::Timeout),
                Err(e) => {
                    debug!("CAN: receive failed: {}", e);
                    return Err(TransportError::NotRunning);
                }
            };

            if !self.filter.matches(&frame) {
                debug!("CAN: ignoring frame for ID=0x{:03X}", frame.id);
                if remaining.is_zero() {
                    return Err(TransportError::Timeout);
                }
                continue;
            }

            let cmd = frame::decode(&frame).inspect_err(|_| {
                warn!(
                    "CAN: malformed frame on ID={} ({} byte payload)",
                    self.address,
                    frame.data.len()
                );
            })?;
            debug!(
                "CAN: received on ID={}: speed={}%, dir={:?}",
                self.address, cmd.speed, cmd.direction
            );
            return Ok(cmd);
        }
    }

    /// Current bus health.  Pure observation.
    pub fn health(&self) -> BusHealth {
        BusHealth::from_medium(self.medium.state())
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }
}

// ── Shared handle cell ────────────────────────────────────────

/// Single-writer cell around the live transport.
///
/// Readers (command receive, health polls) run concurrently; recovery
/// takes the write guard for the whole stop/settle/reopen sequence, so
/// no reader can observe a half-restarted driver.  A panic while holding
/// the lock does not take the node down: the guard is recovered from the
/// poison.
pub struct TransportCell<M: CanMedium> {
    inner: RwLock<Transport<M>>,
}

impl<M: CanMedium> TransportCell<M> {
    pub fn new(transport: Transport<M>) -> Self {
        Self {
            inner: RwLock::new(transport),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Transport<M>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Transport<M>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
