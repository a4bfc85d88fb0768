//! End-to-end node behaviour on the virtual bus.
//!
//! A controller transport sends commands; nodes built with `Node::bring_up`
//! receive, apply, report velocity and survive bus-off.  Most tests drive
//! the tasks one `step()` at a time; the spawned-task tests at the end run
//! all three concurrently.

use std::time::{Duration, Instant};

use crate::mock_hw::{
    FakeCounter, ManualClock, NoopDelay, OutputCall, OutputLog, RecordingPin, RecordingPwm,
    RecordingSink, fast_config, recording_motor,
};

use motornode::adapters::event_channel::event_channel;
use motornode::adapters::time::Esp32TimeAdapter;
use motornode::adapters::virtual_bus::{VirtualBus, VirtualPort};
use motornode::app::events::NodeEvent;
use motornode::app::ports::CanMedium;
use motornode::can::frame::{Direction, Frame, MotorCommand, NodeAddress};
use motornode::can::supervisor::{BusHealth, Fault, TickOutcome};
use motornode::can::transport::Transport;
use motornode::error::{ActuatorError, EncoderError, Error, TransportError};
use motornode::node::{CommandStep, Node};

type TestNode = Node<VirtualPort, RecordingPwm, RecordingPin, FakeCounter, ManualClock, RecordingSink>;

fn addr(raw: u16) -> NodeAddress {
    NodeAddress::new(raw).unwrap()
}

struct Harness {
    node: TestNode,
    port: VirtualPort,
    outputs: OutputLog,
    counter: FakeCounter,
    clock: ManualClock,
    sink: RecordingSink,
}

fn controller(bus: &VirtualBus) -> Transport<VirtualPort> {
    let mut t = Transport::new(bus.port(), addr(0x001));
    t.open().unwrap();
    t
}

fn node_on(bus: &VirtualBus, address: u16) -> Harness {
    let port = bus.port();
    let outputs = OutputLog::default();
    let counter = FakeCounter::default();
    let clock = ManualClock::default();
    let sink = RecordingSink::default();

    let node = Node::bring_up(
        &fast_config(address),
        port.clone(),
        || Ok(recording_motor(&outputs)),
        || Ok(counter.clone()),
        clock.clone(),
        sink.clone(),
        &mut NoopDelay::default(),
        Some(3),
    )
    .unwrap();
    outputs.clear();

    Harness {
        node,
        port,
        outputs,
        counter,
        clock,
        sink,
    }
}

fn send(ctl: &Transport<VirtualPort>, to: u16, speed: i32, direction: Direction) {
    ctl.send(
        addr(to),
        MotorCommand::new(speed, direction),
        Duration::from_millis(10),
    )
    .unwrap();
}

// ── Command path ──────────────────────────────────────────────

#[test]
fn addressed_command_is_applied_exactly_once() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut a = node_on(&bus, 0x121);
    let mut b = node_on(&bus, 0x122);

    send(&ctl, 0x121, 75, Direction::Reverse);

    assert_eq!(a.node.command.step(), CommandStep::Applied { duty: 767 });
    assert_eq!(
        a.outputs.calls(),
        vec![OutputCall::Duty(767), OutputCall::DirHigh]
    );
    assert_eq!(
        a.sink.events(),
        vec![NodeEvent::CommandApplied {
            command: MotorCommand::new(75, Direction::Reverse),
            duty: 767
        }]
    );
    assert_eq!(a.node.command.step(), CommandStep::Idle);
    assert_eq!(a.outputs.calls().len(), 2);

    assert_eq!(b.node.command.step(), CommandStep::Idle);
    assert!(b.outputs.calls().is_empty());
    assert!(b.sink.events().is_empty());
}

#[test]
fn duty_is_written_before_direction() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut n = node_on(&bus, 0x121);

    send(&ctl, 0x121, 50, Direction::Forward);
    n.node.command.step();
    send(&ctl, 0x121, 100, Direction::Reverse);
    n.node.command.step();

    assert_eq!(
        n.outputs.calls(),
        vec![
            OutputCall::Duty(511),
            OutputCall::DirLow,
            OutputCall::Duty(1023),
            OutputCall::DirHigh,
        ]
    );
}

#[test]
fn raw_over_range_speed_is_clamped() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut n = node_on(&bus, 0x121);

    // Put raw bytes on the wire, past the sender-side clamp.
    let frame = Frame::new_standard(addr(0x121), &[200, 0]).unwrap();
    ctl.medium().transmit(&frame, Duration::ZERO).unwrap();

    assert_eq!(n.node.command.step(), CommandStep::Applied { duty: 1023 });
}

#[test]
fn short_frame_is_dropped_without_touching_the_motor() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);
    n.port
        .inject_unfiltered(Frame::new_standard(addr(0x121), &[75]).unwrap());

    assert_eq!(
        n.node.command.step(),
        CommandStep::Dropped(TransportError::Malformed)
    );
    assert!(n.outputs.calls().is_empty());
    assert_eq!(
        n.sink.events(),
        vec![NodeEvent::FrameDropped(TransportError::Malformed)]
    );
}

#[test]
fn frame_past_the_hardware_filter_is_ignored() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);
    n.port
        .inject_unfiltered(Frame::new_standard(addr(0x300), &[90, 1]).unwrap());
    n.port
        .inject_unfiltered(Frame::new_extended(0x121, &[90, 1]).unwrap());

    assert_eq!(n.node.command.step(), CommandStep::Idle);
    assert!(n.outputs.calls().is_empty());
}

#[test]
fn actuator_failure_is_reported_not_fatal() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut n = node_on(&bus, 0x121);

    n.outputs.fail_pwm(true);
    send(&ctl, 0x121, 30, Direction::Forward);
    assert_eq!(
        n.node.command.step(),
        CommandStep::ActuatorFault(ActuatorError::PwmWriteFailed)
    );
    // Duty failed, so the direction was never written.
    assert!(n.outputs.calls().is_empty());

    n.outputs.fail_pwm(false);
    send(&ctl, 0x121, 30, Direction::Forward);
    assert_eq!(n.node.command.step(), CommandStep::Applied { duty: 306 });
}

#[test]
fn direction_failure_leaves_new_duty_applied() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut n = node_on(&bus, 0x121);

    n.outputs.fail_dir(true);
    send(&ctl, 0x121, 60, Direction::Reverse);
    assert_eq!(
        n.node.command.step(),
        CommandStep::ActuatorFault(ActuatorError::GpioWriteFailed)
    );
    assert_eq!(n.outputs.calls(), vec![OutputCall::Duty(613)]);
}

#[test]
fn command_task_backs_off_while_bus_is_down() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);
    n.port.force_bus_off();

    let started = Instant::now();
    assert_eq!(n.node.command.step(), CommandStep::BusDown);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(n.sink.events().is_empty());
}

// ── Telemetry path ────────────────────────────────────────────

#[test]
fn telemetry_reports_rpm_over_the_elapsed_window() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);

    n.counter.set(100);
    n.clock.advance_ms(500);
    let s = n.node.telemetry.step().unwrap();
    assert_eq!(s.count_delta, 100);
    assert!((s.rpm - 20.0).abs() < 1e-3);

    n.counter.set(-200);
    n.clock.advance_ms(500);
    let s = n.node.telemetry.step().unwrap();
    assert_eq!(s.count_delta, -300);
    assert!((s.rpm + 60.0).abs() < 1e-3);

    let reports = n
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::Velocity(_)))
        .count();
    assert_eq!(reports, 2);
}

#[test]
fn encoder_fault_does_not_lose_the_window() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);

    n.counter.set(100);
    n.counter.fail(true);
    n.clock.advance_ms(500);
    assert_eq!(
        n.node.telemetry.step(),
        Err(EncoderError::ReadFailed(-1))
    );
    assert_eq!(
        n.sink.take(),
        vec![NodeEvent::EncoderFault(EncoderError::ReadFailed(-1))]
    );

    n.counter.fail(false);
    n.clock.advance_ms(500);
    let s = n.node.telemetry.step().unwrap();
    assert_eq!(s.elapsed, Duration::from_millis(1000));
    assert!((s.rpm - 10.0).abs() < 1e-3);
}

// ── Supervision path ──────────────────────────────────────────

#[test]
fn bus_off_is_reported_and_recovered() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let mut n = node_on(&bus, 0x121);

    assert_eq!(
        n.node.supervisor.step(),
        TickOutcome::Healthy(BusHealth::Active)
    );
    assert!(n.sink.events().is_empty());

    n.port.force_bus_off();
    assert_eq!(
        n.node.supervisor.step(),
        TickOutcome::Recovered { attempts: 1 }
    );
    assert_eq!(
        n.sink.take(),
        vec![
            NodeEvent::HealthChanged {
                from: BusHealth::Active,
                to: BusHealth::Faulted(Fault::BusOff)
            },
            NodeEvent::Recovered { attempts: 1 },
        ]
    );

    n.node.supervisor.step();
    assert_eq!(
        n.sink.take(),
        vec![NodeEvent::HealthChanged {
            from: BusHealth::Faulted(Fault::BusOff),
            to: BusHealth::Active
        }]
    );

    send(&ctl, 0x121, 20, Direction::Forward);
    assert_eq!(n.node.command.step(), CommandStep::Applied { duty: 204 });
}

#[test]
fn failed_recovery_is_reported_each_attempt() {
    let bus = VirtualBus::new();
    let mut n = node_on(&bus, 0x121);
    n.port.force_bus_off();
    n.port.fail_next_installs(1);

    n.node.supervisor.step();
    n.node.supervisor.step();
    assert_eq!(
        n.sink.take(),
        vec![
            NodeEvent::HealthChanged {
                from: BusHealth::Active,
                to: BusHealth::Faulted(Fault::BusOff)
            },
            NodeEvent::RecoveryFailed {
                error: TransportError::DriverInit,
                attempts: 1
            },
            NodeEvent::Recovered { attempts: 2 },
        ]
    );
}

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn bring_up_retries_transport_install() {
    let bus = VirtualBus::new();
    let port = bus.port();
    port.fail_next_installs(2);
    let outputs = OutputLog::default();
    let delay = NoopDelay::default();

    let node = Node::bring_up(
        &fast_config(0x121),
        port.clone(),
        || Ok(recording_motor(&outputs)),
        || Ok(FakeCounter::default()),
        ManualClock::default(),
        RecordingSink::default(),
        &mut delay.clone(),
        Some(5),
    )
    .unwrap();

    assert_eq!(node.address(), addr(0x121));
    assert!(node.transport().read().is_open());
    assert_eq!(delay.total_ms(), 2);
    // Idle outputs after init.
    assert_eq!(outputs.calls(), vec![OutputCall::Duty(0), OutputCall::DirLow]);
}

#[test]
fn bounded_bring_up_surfaces_the_failing_step() {
    let bus = VirtualBus::new();
    let outputs = OutputLog::default();

    let port = bus.port();
    port.fail_next_installs(10);
    let err = Node::bring_up(
        &fast_config(0x121),
        port,
        || Ok(recording_motor(&outputs)),
        || Ok(FakeCounter::default()),
        ManualClock::default(),
        RecordingSink::default(),
        &mut NoopDelay::default(),
        Some(2),
    )
    .err();
    assert_eq!(err, Some(Error::Transport(TransportError::DriverInit)));

    let err = Node::bring_up(
        &fast_config(0x121),
        bus.port(),
        || Ok(recording_motor(&outputs)),
        || Err::<FakeCounter, _>(EncoderError::InitFailed(-1)),
        ManualClock::default(),
        RecordingSink::default(),
        &mut NoopDelay::default(),
        Some(2),
    )
    .err();
    assert_eq!(err, Some(Error::Encoder(EncoderError::InitFailed(-1))));
}

#[test]
fn bring_up_rejects_invalid_address() {
    let bus = VirtualBus::new();
    let outputs = OutputLog::default();
    let result = Node::bring_up(
        &fast_config(0x800),
        bus.port(),
        || Ok(recording_motor(&outputs)),
        || Ok(FakeCounter::default()),
        ManualClock::default(),
        RecordingSink::default(),
        &mut NoopDelay::default(),
        None,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

// ── Spawned tasks ─────────────────────────────────────────────

#[test]
fn spawned_node_applies_commands_and_reports() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let outputs = OutputLog::default();
    let (events, receiver) = event_channel();

    let node = Node::bring_up(
        &fast_config(0x121),
        bus.port(),
        || Ok(recording_motor(&outputs)),
        || Ok(FakeCounter::default()),
        Esp32TimeAdapter::new(),
        events,
        &mut NoopDelay::default(),
        Some(1),
    )
    .unwrap();
    let tasks = node.spawn().unwrap();
    assert!(tasks.is_running());

    send(&ctl, 0x121, 75, Direction::Reverse);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut applied = None;
    let mut velocity_reports = 0;
    while Instant::now() < deadline && (applied.is_none() || velocity_reports == 0) {
        match receiver.try_next() {
            Some(NodeEvent::CommandApplied { duty, .. }) => applied = Some(duty),
            Some(NodeEvent::Velocity(_)) => velocity_reports += 1,
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }

    assert!(tasks.shutdown());
    assert_eq!(applied, Some(767));
    assert!(velocity_reports > 0);
    assert_eq!(outputs.last_duty(), Some(767));
}

#[test]
fn spawned_node_recovers_from_bus_off_and_keeps_applying() {
    let bus = VirtualBus::new();
    let ctl = controller(&bus);
    let port = bus.port();
    let outputs = OutputLog::default();
    let (events, receiver) = event_channel();

    let node = Node::bring_up(
        &fast_config(0x121),
        port.clone(),
        || Ok(recording_motor(&outputs)),
        || Ok(FakeCounter::default()),
        Esp32TimeAdapter::new(),
        events,
        &mut NoopDelay::default(),
        Some(1),
    )
    .unwrap();
    let tasks = node.spawn().unwrap();

    // Bus-off while the command task is blocked in receive.
    std::thread::sleep(Duration::from_millis(30));
    port.force_bus_off();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut recovered = false;
    while Instant::now() < deadline && !recovered {
        match receiver.try_next() {
            Some(NodeEvent::Recovered { .. }) => recovered = true,
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    assert!(recovered, "driver was not restarted");

    send(&ctl, 0x121, 75, Direction::Reverse);

    let mut applied = None;
    while Instant::now() < deadline && applied.is_none() {
        match receiver.try_next() {
            Some(NodeEvent::CommandApplied { duty, .. }) => applied = Some(duty),
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }

    assert!(tasks.shutdown());
    assert_eq!(applied, Some(767));
    assert_eq!(outputs.last_duty(), Some(767));
}

#[test]
fn bring_up_zeroes_a_counter_that_starts_non_zero() {
    let bus = VirtualBus::new();
    let outputs = OutputLog::default();
    let counter = FakeCounter::default();
    counter.set(4_000);
    let clock = ManualClock::default();

    let mut node = Node::bring_up(
        &fast_config(0x121),
        bus.port(),
        || Ok(recording_motor(&outputs)),
        || Ok(counter.clone()),
        clock.clone(),
        RecordingSink::default(),
        &mut NoopDelay::default(),
        Some(1),
    )
    .unwrap();

    counter.set(60);
    clock.advance_ms(500);
    let s = node.telemetry.step().unwrap();
    assert_eq!(s.count_delta, 60);
    assert!((s.rpm - 12.0).abs() < 1e-3);
}
