//! Software quadrature counter feeding the velocity estimator and the
//! telemetry task.

use std::thread;
use std::time::Duration;

use crate::mock_hw::{ManualClock, RecordingSink};

use motornode::app::events::NodeEvent;
use motornode::app::ports::PulseCounter;
use motornode::can::frame::Direction;
use motornode::node::TelemetryTask;
use motornode::sensors::encoder::{EdgeInput, QuadratureCounter};
use motornode::sensors::velocity::VelocityEstimator;

const PPR: u32 = 600;

fn spin(input: &EdgeInput, direction: Direction, pulses: u32) {
    for _ in 0..pulses {
        input.pulse(direction);
    }
}

#[test]
fn one_revolution_in_half_a_second_is_120_rpm() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();
    let mut estimator = VelocityEstimator::new(counter, PPR);

    // Two counts per A period.
    spin(&input, Direction::Forward, 300);
    let s = estimator.sample(Duration::from_millis(500)).unwrap();
    assert_eq!(s.count, 600);
    assert!((s.revolutions - 1.0).abs() < 1e-6);
    assert!((s.rpm - 120.0).abs() < 1e-3);
}

#[test]
fn reverse_rotation_reports_negative_rpm() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();
    let mut estimator = VelocityEstimator::new(counter, PPR);

    spin(&input, Direction::Forward, 150);
    estimator.sample(Duration::from_millis(100)).unwrap();

    spin(&input, Direction::Reverse, 300);
    let s = estimator.sample(Duration::from_millis(1000)).unwrap();
    assert_eq!(s.count, -300);
    assert_eq!(s.count_delta, -600);
    assert!((s.rpm + 60.0).abs() < 1e-3);
}

#[test]
fn stationary_shaft_reads_zero() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();
    let mut estimator = VelocityEstimator::new(counter, PPR);

    spin(&input, Direction::Forward, 10);
    estimator.sample(Duration::from_millis(100)).unwrap();
    let s = estimator.sample(Duration::from_millis(100)).unwrap();
    assert_eq!(s.count_delta, 0);
    assert_eq!(s.rpm, 0.0);
}

#[test]
fn reset_starts_the_next_window_from_zero() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();
    let mut estimator = VelocityEstimator::new(counter, PPR);

    spin(&input, Direction::Forward, 500);
    estimator.sample(Duration::from_millis(100)).unwrap();
    estimator.reset().unwrap();
    assert_eq!(estimator.counter().count(), Ok(0));

    spin(&input, Direction::Forward, 30);
    let s = estimator.sample(Duration::from_millis(100)).unwrap();
    assert_eq!(s.count_delta, 60);
}

#[test]
fn edges_from_another_thread_are_counted() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();

    let isr = thread::spawn(move || spin(&input, Direction::Reverse, 1000));
    isr.join().unwrap();

    assert_eq!(counter.count(), Ok(-2000));
}

#[test]
fn telemetry_task_reports_counted_edges() {
    let counter = QuadratureCounter::new(-32768, 32767);
    let input = counter.edge_input();
    let clock = ManualClock::default();
    let sink = RecordingSink::default();
    let mut task = TelemetryTask::new(
        VelocityEstimator::new(counter, PPR),
        clock.clone(),
        sink.clone(),
        100,
    );

    spin(&input, Direction::Forward, 150);
    clock.advance_ms(250);
    let s = task.step().unwrap();
    assert!((s.rpm - 120.0).abs() < 1e-3);

    clock.advance_ms(250);
    task.step().unwrap();

    let rpms: Vec<f32> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            NodeEvent::Velocity(s) => Some(s.rpm),
            _ => None,
        })
        .collect();
    assert_eq!(rpms.len(), 2);
    assert_eq!(rpms[1], 0.0);
    assert_eq!(task.estimator().counter().count(), Ok(300));
}
