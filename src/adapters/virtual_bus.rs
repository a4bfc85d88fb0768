//! In-process CAN bus for host simulation and tests.
//!
//! Every [`VirtualPort`] behaves like one node's TWAI controller: it has the
//! same `install → start → stop → uninstall` lifecycle, applies its
//! acceptance filter to incoming traffic, and holds at most
//! [`RX_QUEUE_LEN`] pending frames (newer frames are dropped on overrun,
//! as the hardware does).  A frame transmitted on one port is delivered to
//! every *other* running port whose filter accepts it.
//!
//! Fault injection hooks mirror what a real bus can do to a node: forced
//! bus-off, failing driver installs, and a stalled TX path.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use crate::app::ports::{CanMedium, MediumState};
use crate::can::filter::AcceptanceFilter;
use crate::can::frame::Frame;
use crate::error::MediumError;

/// Receive queue depth per port.
pub const RX_QUEUE_LEN: usize = 5;

#[derive(Default)]
struct PortState {
    filter: Option<AcceptanceFilter>,
    running: bool,
    bus_off: bool,
    rx: VecDeque<Frame>,
    failing_installs: u32,
    stall_tx: bool,
    overruns: u32,
}

impl PortState {
    fn medium_state(&self) -> MediumState {
        if self.bus_off {
            MediumState::BusOff
        } else if self.running {
            MediumState::Running
        } else {
            MediumState::Stopped
        }
    }
}

#[derive(Default)]
struct Shared {
    ports: Mutex<Vec<PortState>>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Vec<PortState>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The shared wire.  Cheap to clone; clones refer to the same bus.
#[derive(Clone, Default)]
pub struct VirtualBus {
    shared: Arc<Shared>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new controller to the bus.
    pub fn port(&self) -> VirtualPort {
        let mut ports = self.shared.lock();
        ports.push(PortState::default());
        VirtualPort {
            shared: Arc::clone(&self.shared),
            index: ports.len() - 1,
        }
    }
}

/// One node's controller on a [`VirtualBus`].  Clones are handles to the
/// same controller, which lets a test keep a handle for fault injection
/// after the port has been moved into a transport.
#[derive(Clone)]
pub struct VirtualPort {
    shared: Arc<Shared>,
    index: usize,
}

impl VirtualPort {
    fn with<R>(&self, f: impl FnOnce(&mut PortState) -> R) -> R {
        let mut ports = self.shared.lock();
        let r = f(&mut ports[self.index]);
        drop(ports);
        self.shared.changed.notify_all();
        r
    }

    // ── Fault injection ───────────────────────────────────────

    /// Drop the controller off the bus, as after excessive TX errors.
    pub fn force_bus_off(&self) {
        self.with(|p| {
            if p.filter.is_some() {
                p.running = false;
                p.bus_off = true;
            }
        });
    }

    /// Make the next `n` driver installs fail.
    pub fn fail_next_installs(&self, n: u32) {
        self.with(|p| p.failing_installs = n);
    }

    /// While set, every transmit waits out its timeout and fails.
    pub fn stall_tx(&self, stalled: bool) {
        self.with(|p| p.stall_tx = stalled);
    }

    /// Place a frame straight into the receive queue, bypassing the
    /// acceptance filter (a frame the hardware filter let through).
    pub fn inject_unfiltered(&self, frame: Frame) {
        self.with(|p| {
            if p.running && p.rx.len() < RX_QUEUE_LEN {
                p.rx.push_back(frame);
            }
        });
    }

    // ── Observation ───────────────────────────────────────────

    /// Frames waiting in the receive queue.
    pub fn pending(&self) -> usize {
        self.with(|p| p.rx.len())
    }

    /// Frames dropped because the receive queue was full.
    pub fn overruns(&self) -> u32 {
        self.with(|p| p.overruns)
    }
}

impl CanMedium for VirtualPort {
    fn install(&self, filter: &AcceptanceFilter) -> Result<(), MediumError> {
        self.with(|p| {
            if p.failing_installs > 0 {
                p.failing_installs -= 1;
                return Err(MediumError::Failed(-1));
            }
            if p.filter.is_some() {
                return Err(MediumError::InvalidState);
            }
            p.filter = Some(*filter);
            p.rx.clear();
            Ok(())
        })
    }

    fn start(&self) -> Result<(), MediumError> {
        self.with(|p| {
            if p.filter.is_none() || p.running || p.bus_off {
                return Err(MediumError::InvalidState);
            }
            p.running = true;
            Ok(())
        })
    }

    fn stop(&self) -> Result<(), MediumError> {
        self.with(|p| {
            if !p.running {
                return Err(MediumError::InvalidState);
            }
            p.running = false;
            Ok(())
        })
    }

    fn uninstall(&self) -> Result<(), MediumError> {
        self.with(|p| {
            if p.filter.is_none() || p.running {
                return Err(MediumError::InvalidState);
            }
            p.filter = None;
            p.bus_off = false;
            p.rx.clear();
            Ok(())
        })
    }

    fn transmit(&self, frame: &Frame, timeout: Duration) -> Result<(), MediumError> {
        let stalled = {
            let ports = self.shared.lock();
            let me = &ports[self.index];
            if !me.running {
                return Err(MediumError::InvalidState);
            }
            me.stall_tx
        };
        if stalled {
            std::thread::sleep(timeout);
            return Err(MediumError::Timeout);
        }

        let mut ports = self.shared.lock();
        for (i, peer) in ports.iter_mut().enumerate() {
            if i == self.index || !peer.running {
                continue;
            }
            let accepted = peer.filter.is_some_and(|f| f.matches(frame));
            if !accepted {
                continue;
            }
            if peer.rx.len() < RX_QUEUE_LEN {
                peer.rx.push_back(frame.clone());
            } else {
                peer.overruns += 1;
                debug!("vbus: port {} RX overrun", i);
            }
        }
        drop(ports);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Frame, MediumError> {
        let deadline = Instant::now() + timeout;
        let mut ports = self.shared.lock();
        loop {
            let me = &mut ports[self.index];
            if !me.running {
                return Err(MediumError::InvalidState);
            }
            if let Some(frame) = me.rx.pop_front() {
                return Ok(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MediumError::Timeout);
            }
            ports = self
                .shared
                .changed
                .wait_timeout(ports, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn state(&self) -> MediumState {
        self.shared.lock()[self.index].medium_state()
    }
}
