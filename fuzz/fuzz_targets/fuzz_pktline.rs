//! Fuzz target for pkt-line decoding.
//!
//! Decoded data packets must re-encode to the bytes they came from.

#![no_main]

use gitwire_protocol::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));
    let mut offset = 0usize;

    // Bounded so crafted input cannot spin forever.
    for _ in 0..1000 {
        match reader.read() {
            Ok(Some(pkt)) => {
                let encoded = pkt.encode().expect("decoded packet must re-encode");
                assert!(data[offset..offset + encoded.len()].eq_ignore_ascii_case(&encoded));
                offset += encoded.len();
                if let PktLine::Data(payload) = pkt {
                    assert!(payload.len() <= gitwire_protocol::MAX_PAYLOAD_LEN);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
});
