//! Simulated PWM hardware.
//!
//! Implements [`ActuatorPort`] for host runs: every pin is a software PWM
//! line that logs its duty writes.  Lines are exclusive; acquiring a pin
//! that is still held fails with a [`HardwareFault`], and dropping a line
//! releases its pin.
//!
//! A real board adapter (Linux sysfs PWM, a PCA9685 expander, an ESP32
//! LEDC channel) implements the same trait by handing out its own
//! `SetDutyCycle` lines.

use core::cell::RefCell;
use std::rc::Rc;

use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};
use log::debug;

use crate::app::ports::ActuatorPort;
use crate::error::HardwareFault;

/// One recorded duty write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyWrite {
    pub pin: u8,
    pub duty: u16,
}

#[derive(Debug, Default)]
struct Bench {
    claimed: Vec<u8>,
    writes: Vec<DutyWrite>,
}

/// Hands out simulated lines whose full-scale duty equals `max_duty`.
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    max_duty: u16,
    bench: Rc<RefCell<Bench>>,
}

impl SimulatedHardware {
    /// With `max_duty` set to the servo period in microseconds, each
    /// recorded duty reads directly as a pulse width.
    pub fn new(max_duty: u16) -> Self {
        Self {
            max_duty,
            bench: Rc::default(),
        }
    }

    /// Every duty write so far, across all pins.
    pub fn writes(&self) -> Vec<DutyWrite> {
        self.bench.borrow().writes.clone()
    }

    /// Duty history of one pin.
    pub fn history(&self, pin: u8) -> Vec<u16> {
        self.bench
            .borrow()
            .writes
            .iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.duty)
            .collect()
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        self.bench.borrow().claimed.contains(&pin)
    }
}

impl ActuatorPort for SimulatedHardware {
    type Line = SimulatedPwm;

    fn acquire(&self, pin: u8) -> Result<SimulatedPwm, HardwareFault> {
        let mut bench = self.bench.borrow_mut();
        if bench.claimed.contains(&pin) {
            return Err(HardwareFault::acquire(pin, "line already in use"));
        }
        bench.claimed.push(pin);
        Ok(SimulatedPwm {
            pin,
            max_duty: self.max_duty,
            bench: self.bench.clone(),
        })
    }
}

/// A claimed simulated line.  Releases its pin on drop.
#[derive(Debug)]
pub struct SimulatedPwm {
    pin: u8,
    max_duty: u16,
    bench: Rc<RefCell<Bench>>,
}

impl ErrorType for SimulatedPwm {
    type Error = ErrorKind;
}

impl SetDutyCycle for SimulatedPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max_duty
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        debug!("PWM pin {} duty {}/{}", self.pin, duty, self.max_duty);
        self.bench.borrow_mut().writes.push(DutyWrite {
            pin: self.pin,
            duty,
        });
        Ok(())
    }
}

impl Drop for SimulatedPwm {
    fn drop(&mut self) {
        self.bench.borrow_mut().claimed.retain(|p| *p != self.pin);
    }
}
