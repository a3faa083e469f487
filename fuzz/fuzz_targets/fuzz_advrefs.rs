//! Fuzz target for reference advertisement decoding.

#![no_main]

use gitwire_protocol::{AdvRefs, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(adv) = AdvRefs::decode(&mut PktLineReader::new(Cursor::new(data))) else {
        return;
    };

    let _ = adv.symrefs();
    if let Some(head) = adv.head {
        assert!(adv.contains_id(&head));
    }

    // Filtering twice must equal filtering once.
    let mut caps = adv.capabilities.clone();
    caps.filter_unsupported();
    let filtered = caps.clone();
    caps.filter_unsupported();
    assert_eq!(caps, filtered);
});
