//! Fuzz target for pkt-line parsing.
//!
//! Tests that the pkt-line reader handles arbitrary input without panicking
//! and that every data packet it accepts is the slice after its prefix.

#![no_main]

use gitweb_git::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));

    // Bounded so crafted input cannot loop forever.
    let mut offset = 0;
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(PktLine::Data(payload))) => {
                let start = offset + 4;
                assert_eq!(&data[start..start + payload.len()], &payload[..]);
                offset = start + payload.len();
            }
            Ok(Some(_)) => offset += 4,
            Ok(None) | Err(_) => break,
        }
    }
});
