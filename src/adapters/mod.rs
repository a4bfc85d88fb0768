//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements   | Connects to                     |
//! |-----------------|--------------|---------------------------------|
//! | `event_channel` | EventSink    | embassy-sync channel → main loop|
//! | `log_sink`      | EventSink    | Serial log output               |
//! | `time`          | TimePort     | ESP32 system timer              |
//! |                 | DelayNs      | FreeRTOS task delay             |
//! | `virtual_bus`   | CanMedium    | In-process bus (host only)      |
//!
//! The TWAI controller adapter lives in `drivers::twai` next to the other
//! raw ESP-IDF peripheral code.

pub mod event_channel;
pub mod log_sink;
pub mod time;
#[cfg(not(target_os = "espidf"))]
pub mod virtual_bus;
