#![no_main]

use callcount::specifier::TargetSpec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Accepted specifiers must round-trip through their raw text
        if let Ok(spec) = TargetSpec::parse(input) {
            assert_eq!(TargetSpec::parse(spec.raw()).as_ref(), Ok(&spec));
        }
    }
});
