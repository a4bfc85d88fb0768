//! Motor command wire format.
//!
//! Wire format (classic CAN, standard 11-bit identifier):
//! ```text
//! ┌──────────────────┬─────────────┬───────────────────┐
//! │ ID (11 bit)      │ byte 0      │ byte 1            │
//! │ target address   │ speed 0–100 │ direction 0 / 1   │
//! └──────────────────┴─────────────┴───────────────────┘
//! ```
//!
//! Speed is clamped into `0..=100` on encode *and* on decode, so every
//! command that leaves this module is in range.  Decoding never rejects a
//! value, only a payload shorter than two bytes.

use heapless::Vec;

use crate::error::{ConfigError, TransportError};

/// Highest standard (11-bit) identifier.
pub const MAX_NODE_ADDRESS: u16 = 0x7FF;

/// Classic CAN payload capacity.
pub const MAX_PAYLOAD: usize = 8;

/// Bytes in a motor command payload.
pub const COMMAND_LEN: usize = 2;

const _: () = assert!(COMMAND_LEN <= MAX_PAYLOAD);

/// Highest commanded speed (percent).
pub const MAX_SPEED: u8 = 100;

// ── Address ───────────────────────────────────────────────────

/// An 11-bit node identifier: this node's receive filter and a peer's
/// send target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddress(u16);

impl NodeAddress {
    pub fn new(raw: u16) -> Result<Self, ConfigError> {
        if raw > MAX_NODE_ADDRESS {
            return Err(ConfigError::ValidationFailed("node address exceeds 11 bits"));
        }
        Ok(Self(raw))
    }

    /// Keep only the low 11 bits of a raw identifier.
    pub const fn from_raw_masked(raw: u32) -> Self {
        Self((raw & MAX_NODE_ADDRESS as u32) as u16)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

// ── Command ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Wire flag: any non-zero byte means reverse.
    pub const fn from_flag(flag: u8) -> Self {
        if flag == 0 { Self::Forward } else { Self::Reverse }
    }

    pub const fn flag(self) -> u8 {
        match self {
            Self::Forward => 0,
            Self::Reverse => 1,
        }
    }
}

/// A speed/direction request.  `speed` is a percentage; values above 100
/// are clamped wherever the command crosses a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorCommand {
    pub speed: u8,
    pub direction: Direction,
}

impl MotorCommand {
    /// Build a command from any integer speed, clamping into `0..=100`.
    pub fn new(speed: i32, direction: Direction) -> Self {
        Self {
            speed: clamp_speed(speed),
            direction,
        }
    }

    /// Same command with the speed clamped into range.
    pub fn clamped(self) -> Self {
        Self {
            speed: self.speed.min(MAX_SPEED),
            direction: self.direction,
        }
    }
}

/// Clamp any integer into the valid speed range `0..=100`.
pub fn clamp_speed(speed: i32) -> u8 {
    speed.clamp(0, MAX_SPEED as i32) as u8
}

// ── Frame ─────────────────────────────────────────────────────

/// A classic CAN data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub extended: bool,
    pub data: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    /// Standard-format frame.  `None` if `data` exceeds 8 bytes.
    pub fn new_standard(id: NodeAddress, data: &[u8]) -> Option<Self> {
        Some(Self {
            id: id.get() as u32,
            extended: false,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// Extended-format (29-bit) frame.  Never addressed to a node, but it
    /// can appear on a shared bus.
    pub fn new_extended(id: u32, data: &[u8]) -> Option<Self> {
        Some(Self {
            id: id & 0x1FFF_FFFF,
            extended: true,
            data: Vec::from_slice(data).ok()?,
        })
    }
}

/// Encode a command addressed to `target`.
pub fn encode(target: NodeAddress, cmd: MotorCommand) -> Frame {
    let cmd = cmd.clamped();
    let payload: [u8; COMMAND_LEN] = [cmd.speed, cmd.direction.flag()];
    let data = match Vec::from_slice(&payload) {
        Ok(data) => data,
        Err(()) => unreachable!("command payload exceeds frame capacity"),
    };
    Frame {
        id: target.get() as u32,
        extended: false,
        data,
    }
}

/// Decode a command payload.  Extra bytes are ignored.
pub fn decode_payload(payload: &[u8]) -> Result<MotorCommand, TransportError> {
    match payload {
        [speed, direction, ..] => Ok(MotorCommand::new(
            *speed as i32,
            Direction::from_flag(*direction),
        )),
        _ => Err(TransportError::Malformed),
    }
}

/// Decode a received frame.
pub fn decode(frame: &Frame) -> Result<MotorCommand, TransportError> {
    decode_payload(&frame.data)
}
