//! MotorNode Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  TwaiMedium    LedcPwm/DirectionPin   PcntEncoder   Esp32Time  │
//! │  (CanMedium)   (embedded-hal PWM/IO)  (PulseCounter)(TimePort) │
//! │  EventPublisher ──▶ main loop ──▶ LogEventSink                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Node: CommandTask · TelemetryTask · SupervisorTask    │    │
//! │  │  Transport · FaultSupervisor · MotorDriver · Velocity  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use motornode::adapters::event_channel::event_channel;
use motornode::adapters::log_sink::LogEventSink;
use motornode::adapters::time::{Esp32TimeAdapter, StdDelay};
use motornode::app::events::NodeEvent;
use motornode::app::ports::EventSink;
use motornode::config::NodeConfig;
use motornode::drivers::hw_init::{DirectionPin, LedcPwm};
use motornode::drivers::motor::MotorDriver;
use motornode::drivers::twai::TwaiMedium;
use motornode::error::ActuatorError;
use motornode::node::Node;
use motornode::sensors::encoder::PcntEncoder;

/// Load the build-time override if one was baked in, else the defaults.
fn load_config() -> NodeConfig {
    match option_env!("MOTORNODE_CONFIG_JSON") {
        Some(json) => match NodeConfig::from_json(json) {
            Ok(cfg) => {
                info!("Config: build-time override");
                cfg
            }
            Err(e) => {
                warn!("Config override rejected ({}), using defaults", e);
                NodeConfig::default()
            }
        },
        None => NodeConfig::default(),
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  MotorNode v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = load_config();
    info!(
        "Node 0x{:03X} @ {} kbit/s, {} PPR",
        config.node_address, config.can_bitrate_kbps, config.pulses_per_revolution
    );

    // ── 3. Bring-up (retries until every peripheral is up) ────
    let (events, receiver) = event_channel();
    let medium = TwaiMedium::new(config.can_tx_gpio, config.can_rx_gpio, config.can_bitrate_kbps);

    let make_motor = || -> Result<_, ActuatorError> {
        let pwm = LedcPwm::new(config.pwm_gpio, config.pwm_freq_hz, config.pwm_resolution_bits)
            .inspect_err(|e| error!("Motor PWM: {}", e))?;
        let dir = DirectionPin::new(config.dir_gpio).inspect_err(|e| error!("Motor DIR: {}", e))?;
        MotorDriver::init(pwm, dir)
    };
    let make_counter = || {
        PcntEncoder::new(
            config.encoder_a_gpio,
            config.encoder_b_gpio,
            config.counter_low_limit,
            config.counter_high_limit,
        )
    };

    let node = Node::bring_up(
        &config,
        medium,
        make_motor,
        make_counter,
        Esp32TimeAdapter::new(),
        events.clone(),
        &mut StdDelay,
        None,
    )?;
    let address = node.address();

    // ── 4. Start tasks ────────────────────────────────────────
    let _tasks = node.spawn()?;
    let mut events = events;
    events.emit(&NodeEvent::Started(address));

    // ── 5. Event loop: forward task events to the log ─────────
    let mut log_sink = LogEventSink::new();
    loop {
        let event = receiver.next_blocking();
        log_sink.emit(&event);
    }
}
