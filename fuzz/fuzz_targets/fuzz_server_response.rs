//! Fuzz target for the messages a client reads after sending a request.

#![no_main]

use gitwire_protocol::{
    Acknowledgement, PktLineReader, ReportStatus, ShallowUpdate, SidebandReader,
};
use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    let _ = ReportStatus::decode(&mut PktLineReader::new(Cursor::new(data)));

    let mut reader = PktLineReader::new(Cursor::new(data));
    if data.first().is_some_and(|b| b % 2 == 0) && ShallowUpdate::decode(&mut reader).is_err() {
        return;
    }
    if Acknowledgement::decode(&mut reader).is_err() {
        return;
    }
    let mut pack = Vec::new();
    let _ = SidebandReader::new(reader).read_to_end(&mut pack);
});
