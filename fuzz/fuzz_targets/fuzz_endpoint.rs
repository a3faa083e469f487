//! Fuzz target for endpoint parsing.

#![no_main]

use gitwire_protocol::Endpoint;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(endpoint) = Endpoint::parse(raw) {
        let _ = endpoint.base_url();
        let _ = endpoint.redacted();
        let _ = endpoint.host_with_port();
        let _ = endpoint.effective_port();
    }
});
