//! Fuzz target: `Command::decode`
//!
//! Feeds arbitrary queue message bodies into the decoder.  It must never
//! panic, and anything it accepts must survive an encode/decode trip
//! unchanged.
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use petfeeder::Command;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(command) = Command::decode(body) {
        assert!(!command.id.as_str().is_empty(), "decoder accepted an empty id");
        let again = Command::decode(&command.encode()).expect("re-decode of encoded command");
        assert_eq!(again, command);
    }
});
