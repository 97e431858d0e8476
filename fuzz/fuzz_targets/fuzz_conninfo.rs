#![no_main]

use libfuzzer_sys::fuzz_target;
use pgconnect::conninfo::{parse_conninfo, quote_value, resolve};
use pgconnect::ResolveContext;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(pairs) = parse_conninfo(input) {
        // Quoting every value must parse back to the same pairs
        let rebuilt: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, quote_value(v)))
            .collect();
        let reparsed = parse_conninfo(&rebuilt.join(" ")).expect("quoted conninfo must parse");
        assert_eq!(pairs, reparsed);
    }

    let ctx = ResolveContext::new().with_os_user("fuzz");
    let _ = resolve(input, &ctx);
});
