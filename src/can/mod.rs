//! Addressed CAN command channel.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CAN Stack                             │
//! │                                                              │
//! │  ┌───────────┐   ┌───────────┐   ┌───────────────────────┐   │
//! │  │ CanMedium │──▶│  Filter   │──▶│  Transport            │   │
//! │  │ (port)    │   │ (11-bit)  │   │  encode / decode      │   │
//! │  └───────────┘   └───────────┘   └───────────────────────┘   │
//! │        ▲                                    ▲                │
//! │        │          ┌─────────────────────┐   │                │
//! │        └──────────│  FaultSupervisor    │───┘                │
//! │     stop/reinit   │  (bus-off polling)  │  exclusive access  │
//! │                   └─────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod filter;
pub mod frame;
pub mod supervisor;
pub mod transport;
