//! Fuzz target: `Interval::parse`
//!
//! Any accepted expression must fire at least once a day: `next_after`
//! returns a strictly later minute that `matches`.
//!
//! cargo fuzz run fuzz_interval_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use petfeeder::Interval;

fuzz_target!(|data: (&str, u32)| {
    let (expr, minutes) = data;
    if let Ok(interval) = Interval::parse(expr) {
        let t = u64::from(minutes) * 60_000 + 17;
        let next = interval.next_after(t);
        assert!(next > t);
        assert!(interval.matches(next));
        assert_eq!(Interval::parse(interval.as_str()).as_ref(), Ok(&interval));
    }
});
