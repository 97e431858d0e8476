#![no_main]

use libfuzzer_sys::fuzz_target;
use pgconnect::protocol::{decode_auth_frame, decode_frame, Decoded};

fuzz_target!(|data: &[u8]| {
    // Authentication phase: a frame, a legacy error, or a protocol error
    let mut rest = data;
    while !rest.is_empty() {
        match decode_auth_frame(rest) {
            Ok(Decoded::Parsed { consumed, .. }) => {
                assert!(consumed > 0 && consumed <= rest.len());
                rest = &rest[consumed..];
            }
            Ok(Decoded::NeedMoreData { required }) => {
                assert!(required > rest.len());
                break;
            }
            Err(_) => break,
        }
    }

    // Post-authentication framing over the same bytes
    let mut rest = data;
    while let Ok(Decoded::Parsed { consumed, .. }) = decode_frame(rest) {
        rest = &rest[consumed..];
    }
});
