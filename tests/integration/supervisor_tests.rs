//! Fault supervisor against the virtual bus.
//!
//! Drives `FaultSupervisor::tick` directly with a no-op delay and injects
//! bus-off and failing driver installs through a port handle.

use std::time::Duration;

use crate::mock_hw::NoopDelay;

use motornode::adapters::virtual_bus::{VirtualBus, VirtualPort};
use motornode::app::ports::{CanMedium, MediumState};
use motornode::can::frame::{Direction, MotorCommand, NodeAddress};
use motornode::can::supervisor::{BusHealth, Fault, FaultSupervisor, SupervisorState, TickOutcome};
use motornode::can::transport::{Transport, TransportCell};
use motornode::error::TransportError;

const SETTLE_MS: u32 = 100;

fn addr(raw: u16) -> NodeAddress {
    NodeAddress::new(raw).unwrap()
}

struct Rig {
    port: VirtualPort,
    cell: TransportCell<VirtualPort>,
    peer: Transport<VirtualPort>,
    delay: NoopDelay,
    supervisor: FaultSupervisor<NoopDelay>,
}

fn rig() -> Rig {
    let bus = VirtualBus::new();
    let port = bus.port();
    let mut transport = Transport::new(port.clone(), addr(0x121));
    transport.open().unwrap();
    let mut peer = Transport::new(bus.port(), addr(0x001));
    peer.open().unwrap();
    let delay = NoopDelay::default();
    Rig {
        port,
        cell: TransportCell::new(transport),
        peer,
        supervisor: FaultSupervisor::new(delay.clone(), SETTLE_MS),
        delay,
    }
}

#[test]
fn healthy_bus_is_left_alone() {
    let mut r = rig();
    for _ in 0..3 {
        assert_eq!(
            r.supervisor.tick(&r.cell),
            TickOutcome::Healthy(BusHealth::Active)
        );
    }
    assert_eq!(r.delay.total_ms(), 0);
    assert_eq!(r.supervisor.recoveries(), 0);
}

#[test]
fn bus_off_is_recovered_in_one_tick() {
    let mut r = rig();
    r.port.force_bus_off();
    assert_eq!(
        r.cell.read().health(),
        BusHealth::Faulted(Fault::BusOff)
    );

    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 1 }
    );
    assert_eq!(r.supervisor.state(), SupervisorState::Active);
    assert_eq!(r.supervisor.last_fault(), Some(Fault::BusOff));
    assert_eq!(r.delay.total_ms(), SETTLE_MS);
    assert_eq!(r.port.state(), MediumState::Running);
    assert!(r.cell.read().is_open());
}

#[test]
fn traffic_flows_after_recovery() {
    let mut r = rig();
    r.port.force_bus_off();
    r.supervisor.tick(&r.cell);

    let cmd = MotorCommand::new(40, Direction::Forward);
    r.peer.send(addr(0x121), cmd, Duration::from_millis(10)).unwrap();
    let got = r.cell.read().receive(Duration::from_millis(100)).unwrap();
    assert_eq!(got, cmd);
}

#[test]
fn failed_reopen_retries_on_following_ticks() {
    let mut r = rig();
    r.port.force_bus_off();
    r.port.fail_next_installs(2);

    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::RecoveryFailed {
            error: TransportError::DriverInit,
            attempts: 1
        }
    );
    assert_eq!(r.supervisor.state(), SupervisorState::Recovering);
    assert!(!r.cell.read().is_open());

    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::RecoveryFailed {
            error: TransportError::DriverInit,
            attempts: 2
        }
    );
    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 3 }
    );
    assert_eq!(r.supervisor.recoveries(), 1);
    assert_eq!(r.delay.total_ms(), 3 * SETTLE_MS);
}

#[test]
fn recovery_never_gives_up() {
    let mut r = rig();
    r.port.force_bus_off();
    r.port.fail_next_installs(50);
    for n in 1..=50 {
        assert!(matches!(
            r.supervisor.tick(&r.cell),
            TickOutcome::RecoveryFailed { attempts, .. } if attempts == n
        ));
    }
    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 51 }
    );
}

#[test]
fn unexpectedly_stopped_driver_is_restarted() {
    let mut r = rig();
    r.port.stop().unwrap();
    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 1 }
    );
    assert_eq!(r.supervisor.last_fault(), Some(Fault::Stopped));
    assert_eq!(r.port.state(), MediumState::Running);
}

#[test]
fn second_episode_counts_attempts_from_one() {
    let mut r = rig();
    r.port.force_bus_off();
    r.port.fail_next_installs(1);
    r.supervisor.tick(&r.cell);
    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 2 }
    );

    r.port.force_bus_off();
    assert_eq!(
        r.supervisor.tick(&r.cell),
        TickOutcome::Recovered { attempts: 1 }
    );
    assert_eq!(r.supervisor.recoveries(), 2);
}

#[test]
fn stale_rx_is_discarded_by_restart() {
    let mut r = rig();
    r.peer
        .send(addr(0x121), MotorCommand::new(10, Direction::Forward), Duration::ZERO)
        .unwrap();
    assert_eq!(r.port.pending(), 1);

    r.port.force_bus_off();
    r.supervisor.tick(&r.cell);
    assert_eq!(r.port.pending(), 0);
    assert_eq!(
        r.cell.read().receive(Duration::from_millis(5)),
        Err(TransportError::Timeout)
    );
}

#[test]
fn send_on_bus_off_is_not_running_until_recovered() {
    let mut r = rig();
    r.port.force_bus_off();
    let cmd = MotorCommand::new(10, Direction::Forward);

    assert_eq!(
        r.cell.read().send(addr(0x001), cmd, Duration::from_millis(5)),
        Err(TransportError::NotRunning)
    );

    r.supervisor.tick(&r.cell);
    assert_eq!(
        r.cell.read().send(addr(0x001), cmd, Duration::from_millis(5)),
        Ok(())
    );
    assert_eq!(
        r.peer.receive(Duration::from_millis(50)),
        Ok(cmd)
    );
}
