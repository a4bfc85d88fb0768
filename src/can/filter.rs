//! Single-filter acceptance configuration for standard frames.
//!
//! The TWAI controller compares the incoming identifier, left-aligned in a
//! 32-bit word, against `code`; bits set in `mask` are "don't care".  For
//! a standard frame the identifier occupies bits 31..21, so an exact
//! match on the 11-bit ID is `code = id << 21`, `mask = !(0x7FF << 21)`.

use super::frame::{Frame, MAX_NODE_ADDRESS, NodeAddress};

/// Bit offset of a standard identifier in the acceptance registers.
const STD_ID_SHIFT: u32 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptanceFilter {
    pub code: u32,
    pub mask: u32,
    pub single: bool,
}

impl AcceptanceFilter {
    /// Accept only standard frames whose identifier equals `address`.
    pub const fn exact(address: NodeAddress) -> Self {
        Self {
            code: (address.get() as u32) << STD_ID_SHIFT,
            mask: !((MAX_NODE_ADDRESS as u32) << STD_ID_SHIFT),
            single: true,
        }
    }

    /// Accept every frame.
    pub const fn accept_all() -> Self {
        Self {
            code: 0,
            mask: u32::MAX,
            single: true,
        }
    }

    /// Whether the controller would deliver `frame`.
    ///
    /// Extended frames never match: this node only speaks the standard
    /// format.
    pub fn matches(&self, frame: &Frame) -> bool {
        if frame.extended {
            return self.mask == u32::MAX;
        }
        let aligned = (frame.id & MAX_NODE_ADDRESS as u32) << STD_ID_SHIFT;
        (aligned ^ self.code) & !self.mask == 0
    }
}
