#![no_main]

use callcount::script::Script;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing an arbitrary program must not panic
        if let Ok(script) = Script::parse(input) {
            assert_eq!(script.statements().count(), script.len());
        }
    }
});
