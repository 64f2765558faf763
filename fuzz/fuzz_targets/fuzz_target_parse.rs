#![no_main]
use libfuzzer_sys::fuzz_target;
use sorparse::ParseOptions;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the parser; a map failure is fine
    let _ = sorparse::parse_bytes("fuzz.sor", data, &ParseOptions::default());
    let _ = sorparse::parse_bytes(
        "fuzz.sor",
        data,
        &ParseOptions {
            include_trace_samples: true,
        },
    );
});
