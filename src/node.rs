//! Node context and its three concurrent tasks.
//!
//! ```text
//!                 ┌──────────────────────────┐
//!   CAN bus ─────▶│ TransportCell (RwLock)   │◀──── write: restart
//!                 └──────────┬───────────────┘            │
//!                      read  │  read                      │
//!              ┌─────────────┘    └──────────┐            │
//!              ▼                             ▼            │
//!      ┌───────────────┐            ┌─────────────────┐   │
//!      │ CommandTask   │            │ SupervisorTask  │───┘
//!      │ receive→apply │            │ poll→recover    │
//!      └───────┬───────┘            └────────┬────────┘
//!              ▼                             │
//!        MotorDriver                         │
//!                                            │
//!      ┌───────────────┐                     │
//!      │ TelemetryTask │  encoder → RPM      │
//!      └───────┬───────┘                     │
//!              └──────────── NodeEvent ──────┴──▶ EventSink
//! ```
//!
//! Each task owns what it touches: the command task owns the motor, the
//! telemetry task owns the encoder, and only the transport is shared.
//! `step()` runs one iteration (tests drive tasks this way); `run()`
//! loops until the node is shut down.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::info;

use crate::adapters::time::StdDelay;
use crate::app::events::NodeEvent;
use crate::app::ports::{CanMedium, EventSink, PulseCounter, TimePort};
use crate::bringup;
use crate::can::frame::NodeAddress;
use crate::can::supervisor::{BusHealth, FaultSupervisor, TickOutcome};
use crate::can::transport::{Transport, TransportCell};
use crate::config::NodeConfig;
use crate::drivers::motor::MotorDriver;
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::{ActuatorError, EncoderError, Result, TransportError};
use crate::sensors::velocity::{VelocityEstimator, VelocitySample};

/// Pause after a receive on a bus that is down, so the supervisor can
/// take the transport.
const BUS_DOWN_BACKOFF_MS: u32 = 100;

pub const COMMAND_TASK: TaskSpec = TaskSpec {
    name: "can-rx\0",
    core: Core::App,
    priority: 5,
    stack_kb: 8,
};

pub const TELEMETRY_TASK: TaskSpec = TaskSpec {
    name: "telemetry\0",
    core: Core::App,
    priority: 5,
    stack_kb: 8,
};

pub const SUPERVISOR_TASK: TaskSpec = TaskSpec {
    name: "can-supervisor\0",
    core: Core::Pro,
    priority: 6,
    stack_kb: 8,
};

// ── Command task ──────────────────────────────────────────────

/// What one command-task iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStep {
    Applied { duty: u16 },
    /// Nothing arrived within the receive timeout.
    Idle,
    Dropped(TransportError),
    ActuatorFault(ActuatorError),
    /// Transport closed or bus down; backed off.
    BusDown,
}

/// Receives commands addressed to this node and applies them to the motor.
pub struct CommandTask<M: CanMedium, P: SetDutyCycle, D: OutputPin, S: EventSink> {
    transport: Arc<TransportCell<M>>,
    motor: MotorDriver<P, D>,
    events: S,
    rx_timeout: Duration,
    delay: StdDelay,
}

impl<M, P, D, S> CommandTask<M, P, D, S>
where
    M: CanMedium,
    P: SetDutyCycle,
    D: OutputPin,
    S: EventSink,
{
    pub fn new(
        transport: Arc<TransportCell<M>>,
        motor: MotorDriver<P, D>,
        events: S,
        rx_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            motor,
            events,
            rx_timeout,
            delay: StdDelay,
        }
    }

    pub fn step(&mut self) -> CommandStep {
        // The read guard is released before the command is applied.
        let received = self.transport.read().receive(self.rx_timeout);

        match received {
            Ok(command) => match self.motor.apply(command) {
                Ok(duty) => {
                    self.events.emit(&NodeEvent::CommandApplied { command, duty });
                    CommandStep::Applied { duty }
                }
                Err(e) => {
                    self.events.emit(&NodeEvent::ActuatorFault(e));
                    CommandStep::ActuatorFault(e)
                }
            },
            Err(TransportError::Timeout) => CommandStep::Idle,
            Err(TransportError::NotRunning) => {
                self.delay.delay_ms(BUS_DOWN_BACKOFF_MS);
                CommandStep::BusDown
            }
            Err(e) => {
                self.events.emit(&NodeEvent::FrameDropped(e));
                CommandStep::Dropped(e)
            }
        }
    }

    pub fn run(mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.step();
        }
    }

    pub fn motor(&self) -> &MotorDriver<P, D> {
        &self.motor
    }
}

// ── Telemetry task ────────────────────────────────────────────

/// Samples the encoder every period and reports the shaft velocity.
pub struct TelemetryTask<C: PulseCounter, T: TimePort, S: EventSink> {
    estimator: VelocityEstimator<C>,
    time: T,
    events: S,
    period_ms: u32,
    last_us: u64,
    delay: StdDelay,
}

impl<C, T, S> TelemetryTask<C, T, S>
where
    C: PulseCounter,
    T: TimePort,
    S: EventSink,
{
    pub fn new(estimator: VelocityEstimator<C>, time: T, events: S, period_ms: u32) -> Self {
        let last_us = time.uptime_us();
        Self {
            estimator,
            time,
            events,
            period_ms,
            last_us,
            delay: StdDelay,
        }
    }

    /// Sample over the time since the last successful sample.
    pub fn step(&mut self) -> core::result::Result<VelocitySample, EncoderError> {
        let now = self.time.uptime_us();
        let elapsed = Duration::from_micros(now.saturating_sub(self.last_us));

        match self.estimator.sample(elapsed) {
            Ok(sample) => {
                self.last_us = now;
                self.events.emit(&NodeEvent::Velocity(sample));
                Ok(sample)
            }
            Err(e) => {
                self.events.emit(&NodeEvent::EncoderFault(e));
                Err(e)
            }
        }
    }

    pub fn run(mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.delay.delay_ms(self.period_ms);
            let _ = self.step();
        }
    }

    pub fn estimator(&self) -> &VelocityEstimator<C> {
        &self.estimator
    }
}

// ── Supervisor task ───────────────────────────────────────────

/// Polls bus health every period and restarts the driver after bus-off.
pub struct SupervisorTask<M: CanMedium, D: DelayNs, S: EventSink> {
    transport: Arc<TransportCell<M>>,
    supervisor: FaultSupervisor<D>,
    events: S,
    period_ms: u32,
    last_health: BusHealth,
    delay: StdDelay,
}

impl<M, D, S> SupervisorTask<M, D, S>
where
    M: CanMedium,
    D: DelayNs,
    S: EventSink,
{
    pub fn new(
        transport: Arc<TransportCell<M>>,
        supervisor: FaultSupervisor<D>,
        events: S,
        period_ms: u32,
    ) -> Self {
        Self {
            transport,
            supervisor,
            events,
            period_ms,
            last_health: BusHealth::Active,
            delay: StdDelay,
        }
    }

    pub fn step(&mut self) -> TickOutcome {
        let outcome = self.supervisor.tick(&self.transport);
        match outcome {
            TickOutcome::Healthy(health) => self.observe(health),
            TickOutcome::Recovered { attempts } => {
                self.observe_fault();
                self.events.emit(&NodeEvent::Recovered { attempts });
            }
            TickOutcome::RecoveryFailed { error, attempts } => {
                self.observe_fault();
                self.events
                    .emit(&NodeEvent::RecoveryFailed { error, attempts });
            }
        }
        outcome
    }

    fn observe(&mut self, health: BusHealth) {
        if health != self.last_health {
            self.events.emit(&NodeEvent::HealthChanged {
                from: self.last_health,
                to: health,
            });
            self.last_health = health;
        }
    }

    fn observe_fault(&mut self) {
        if let Some(fault) = self.supervisor.last_fault() {
            self.observe(BusHealth::Faulted(fault));
        }
    }

    pub fn run(mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            self.step();
            self.delay.delay_ms(self.period_ms);
        }
    }

    pub fn supervisor(&self) -> &FaultSupervisor<D> {
        &self.supervisor
    }

    pub fn last_health(&self) -> BusHealth {
        self.last_health
    }
}

// ── Node ──────────────────────────────────────────────────────

/// The owned node context: one task per concern, sharing only the
/// transport.
pub struct Node<M, P, D, C, T, S>
where
    M: CanMedium,
    P: SetDutyCycle,
    D: OutputPin,
    C: PulseCounter,
    T: TimePort,
    S: EventSink,
{
    pub command: CommandTask<M, P, D, S>,
    pub telemetry: TelemetryTask<C, T, S>,
    pub supervisor: SupervisorTask<M, StdDelay, S>,
    address: NodeAddress,
    transport: Arc<TransportCell<M>>,
}

impl<M, P, D, C, T, S> Node<M, P, D, C, T, S>
where
    M: CanMedium,
    P: SetDutyCycle,
    D: OutputPin,
    C: PulseCounter,
    T: TimePort,
    S: EventSink + Clone,
{
    /// Assemble a node from already-initialised parts.  `transport` should
    /// be open.
    pub fn new(
        config: &NodeConfig,
        transport: Transport<M>,
        motor: MotorDriver<P, D>,
        counter: C,
        time: T,
        events: S,
    ) -> Self {
        let address = transport.address();
        let cell = Arc::new(TransportCell::new(transport));

        let command = CommandTask::new(
            Arc::clone(&cell),
            motor,
            events.clone(),
            Duration::from_millis(u64::from(config.rx_timeout_ms)),
        );
        let telemetry = TelemetryTask::new(
            VelocityEstimator::new(counter, config.pulses_per_revolution),
            time,
            events.clone(),
            config.telemetry_period_ms,
        );
        let supervisor = SupervisorTask::new(
            Arc::clone(&cell),
            FaultSupervisor::new(StdDelay, config.settle_delay_ms),
            events,
            config.supervisor_period_ms,
        );

        Self {
            command,
            telemetry,
            supervisor,
            address,
            transport: cell,
        }
    }

    /// Bring the node up in order: transport, actuator, encoder.  Each
    /// step is retried every `init_retry_ms`; with `max_attempts = None`
    /// this only returns once everything is up.
    #[allow(clippy::too_many_arguments)]
    pub fn bring_up(
        config: &NodeConfig,
        medium: M,
        mut make_motor: impl FnMut() -> core::result::Result<MotorDriver<P, D>, ActuatorError>,
        mut make_counter: impl FnMut() -> core::result::Result<C, EncoderError>,
        time: T,
        events: S,
        delay: &mut impl DelayNs,
        max_attempts: Option<u32>,
    ) -> Result<Self> {
        config.validate()?;
        let address = NodeAddress::new(config.node_address)?;
        let interval = config.init_retry_ms;

        let mut transport = Transport::new(medium, address);
        bringup::retry("CAN transport", &mut *delay, interval, max_attempts, || {
            transport.open()
        })?;
        let motor = bringup::retry("Motor", &mut *delay, interval, max_attempts, &mut make_motor)?;
        let counter = bringup::retry("Encoder", &mut *delay, interval, max_attempts, &mut make_counter)?;

        let mut node = Self::new(config, transport, motor, counter, time, events);
        // The first telemetry window starts from a zeroed count.
        node.telemetry.estimator.reset()?;

        info!("Node {} up", address);
        Ok(node)
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// Shared transport handle (fault injection and inspection).
    pub fn transport(&self) -> Arc<TransportCell<M>> {
        Arc::clone(&self.transport)
    }
}

impl<M, P, D, C, T, S> Node<M, P, D, C, T, S>
where
    M: CanMedium + 'static,
    P: SetDutyCycle + Send + 'static,
    D: OutputPin + Send + 'static,
    C: PulseCounter + Send + 'static,
    T: TimePort + Send + 'static,
    S: EventSink + Send + 'static,
{
    /// Start the three tasks on their pinned threads.
    pub fn spawn(self) -> io::Result<NodeTasks> {
        let running = Arc::new(AtomicBool::new(true));
        let mut tasks = NodeTasks {
            running: Arc::clone(&running),
            handles: Vec::with_capacity(3),
        };

        let Self {
            command,
            telemetry,
            supervisor,
            ..
        } = self;

        let flag = Arc::clone(&running);
        tasks.push(task_pin::spawn_on_core(SUPERVISOR_TASK, move || {
            supervisor.run(&flag);
        }))?;
        let flag = Arc::clone(&running);
        tasks.push(task_pin::spawn_on_core(COMMAND_TASK, move || {
            command.run(&flag);
        }))?;
        let flag = running;
        tasks.push(task_pin::spawn_on_core(TELEMETRY_TASK, move || {
            telemetry.run(&flag);
        }))?;

        Ok(tasks)
    }
}

/// Handles to the running tasks.
pub struct NodeTasks {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl NodeTasks {
    fn push(&mut self, spawned: io::Result<JoinHandle<()>>) -> io::Result<()> {
        match spawned {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(e) => {
                // Let whatever already started wind down.
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every task to stop after its current iteration and wait for
    /// them.  Returns `false` if a task panicked.
    pub fn shutdown(self) -> bool {
        self.running.store(false, Ordering::Release);
        self.handles
            .into_iter()
            .map(JoinHandle::join)
            .fold(true, |clean, joined| clean & joined.is_ok())
    }
}
