//! Fuzz target: motor command decoding and acceptance filtering
//!
//! The first two bytes pick an identifier and frame format, the rest is the
//! payload.  Decoding must never panic, must only fail on short payloads,
//! and must never yield a speed above 100.  The acceptance filter must
//! agree with a plain identifier comparison.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use motornode::can::filter::AcceptanceFilter;
use motornode::can::frame::{self, Frame, NodeAddress, MAX_PAYLOAD};
use motornode::error::TransportError;

// Links the std critical-section implementation.
use critical_section as _;

const NODE: NodeAddress = NodeAddress::from_raw_masked(0x121);

fuzz_target!(|data: &[u8]| {
    let Some((&[hi, lo], payload)) = data.split_first_chunk::<2>() else {
        return;
    };
    let raw_id = u32::from(u16::from_be_bytes([hi & 0x7F, lo]));
    let extended = hi & 0x80 != 0;

    match frame::decode_payload(payload) {
        Ok(cmd) => {
            assert!(payload.len() >= 2);
            assert!(cmd.speed <= 100, "speed out of range: {}", cmd.speed);
            assert_eq!(cmd.speed, payload[0].min(100));
        }
        Err(e) => {
            assert!(payload.len() < 2);
            assert_eq!(e, TransportError::Malformed);
        }
    }

    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    let frame = if extended {
        Frame::new_extended(raw_id, payload)
    } else {
        Frame::new_standard(NodeAddress::from_raw_masked(raw_id), payload)
    };
    let Some(frame) = frame else {
        return;
    };

    let filter = AcceptanceFilter::exact(NODE);
    let expected = !extended && frame.id == u32::from(NODE.get());
    assert_eq!(filter.matches(&frame), expected);
    assert!(AcceptanceFilter::accept_all().matches(&frame));
});
