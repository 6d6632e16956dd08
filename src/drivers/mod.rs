//! Actuator drivers and the feeding-cycle sequencer.

pub mod sequencer;
pub mod servo;
