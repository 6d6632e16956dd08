//! Hobby-servo driver over one PWM line.
//!
//! A 50 Hz servo is positioned by pulse width: the line is driven at
//! `pulse_us / period_us` duty.  "Rest" means no pulses at all (duty fully
//! off), which lets the horn relax and draws no holding current.
//!
//! ## Safety contract
//!
//! The line is returned to rest on every exit path.  Dropping a driver
//! that is still holding a position forces rest, so an aborted or
//! cancelled sequence never leaves the auger turning.

use embedded_hal::pwm::SetDutyCycle;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoState {
    Rest,
    Holding { pulse_us: u16 },
}

pub struct ServoDriver<P: SetDutyCycle> {
    line: P,
    pin: u8,
    period_us: u16,
    state: ServoState,
}

impl<P: SetDutyCycle> ServoDriver<P> {
    /// Wrap an acquired line.  The line is assumed to be at rest.
    pub fn new(line: P, pin: u8, period_us: u16) -> Self {
        Self {
            line,
            pin,
            period_us,
            state: ServoState::Rest,
        }
    }

    /// Drive the line at `pulse_us` (clamped to the period).
    pub fn set_pulse(&mut self, pulse_us: u16) -> Result<(), P::Error> {
        let pulse_us = pulse_us.min(self.period_us);
        // Mark as holding first: a failed write may have left the line live.
        self.state = ServoState::Holding { pulse_us };
        self.line.set_duty_cycle_fraction(pulse_us, self.period_us)?;
        debug!("servo pin {}: {} us", self.pin, pulse_us);
        Ok(())
    }

    /// Stop pulsing.
    pub fn rest(&mut self) -> Result<(), P::Error> {
        self.line.set_duty_cycle_fully_off()?;
        self.state = ServoState::Rest;
        Ok(())
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl<P: SetDutyCycle> Drop for ServoDriver<P> {
    fn drop(&mut self) {
        if self.state == ServoState::Rest {
            return;
        }
        warn!("servo pin {} released mid-sequence, forcing rest", self.pin);
        if self.rest().is_err() {
            warn!("servo pin {}: rest write failed on release", self.pin);
        }
    }
}
