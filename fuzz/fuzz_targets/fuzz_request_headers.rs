//! Fuzz target for request header and path segment parsing.
//!
//! Everything here runs on untrusted input before any process is spawned.

#![no_main]

use gitweb_git::{ContentEncoding, PackService};
use gitweb_node::{auth::parse_basic, repo::is_valid_name};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    let _ = parse_basic(&input);
    let _ = ContentEncoding::from_header(Some(&input));
    let _ = PackService::resolve(&input);

    if is_valid_name(&input) {
        assert!(!input.contains('/'));
        assert!(!input.contains('.'));
    }
});
