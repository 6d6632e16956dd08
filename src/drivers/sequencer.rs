//! Actuator sequencer: one feeding cycle on one servo.
//!
//! ```text
//!   acquire(pin) ─▶ Dispense ─▶ ClearJam ─▶ Redispense ─▶ Close ─▶ rest ─▶ release
//!                   (fwd)       (rev)       (fwd)          (rev)
//! ```
//!
//! Every phase is held for the device's `phase_ms`.  Phases run to
//! completion once started.  A failed duty write aborts the remaining
//! phases; the [`ServoDriver`] drop guard then forces rest before the
//! line is released, so the fault path and the success path end in the
//! same physical position.

use embedded_hal::pwm::Error as _;
use log::{info, warn};

use crate::app::ports::{ActuatorPort, ClockPort};
use crate::config::ServoConfig;
use crate::drivers::servo::ServoDriver;
use crate::error::HardwareFault;
use crate::registry::DeviceConfig;

/// One timed step of the feeding motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Turn the auger to push food into the chute.
    Dispense,
    /// Back off briefly to free kibble wedged in the auger.
    ClearJam,
    /// Second forward pass to deliver what the jam held back.
    Redispense,
    /// Close the chute.
    Close,
}

impl Phase {
    /// The fixed motion, in order.
    pub const SEQUENCE: [Phase; 4] = [
        Phase::Dispense,
        Phase::ClearJam,
        Phase::Redispense,
        Phase::Close,
    ];

    pub fn is_forward(self) -> bool {
        matches!(self, Phase::Dispense | Phase::Redispense)
    }
}

/// Drives the four-phase feeding motion.  Stateless between calls.
#[derive(Debug, Clone, Copy)]
pub struct ActuatorSequencer {
    servo: ServoConfig,
}

impl ActuatorSequencer {
    pub fn new(servo: ServoConfig) -> Self {
        Self { servo }
    }

    /// Pulse width commanded during `phase`.
    pub fn pulse_for(&self, phase: Phase) -> u16 {
        if phase.is_forward() {
            self.servo.forward_pulse_us
        } else {
            self.servo.reverse_pulse_us
        }
    }

    /// Run one complete feeding cycle on `device`.
    pub async fn actuate<H, C>(
        &self,
        hardware: &H,
        clock: &C,
        device: &DeviceConfig,
    ) -> Result<(), HardwareFault>
    where
        H: ActuatorPort,
        C: ClockPort,
    {
        let line = hardware.acquire(device.pin)?;
        let mut servo = ServoDriver::new(line, device.pin, self.servo.period_us);
        let hold = device.phase_duration();

        for phase in Phase::SEQUENCE {
            if let Err(e) = servo.set_pulse(self.pulse_for(phase)) {
                warn!("{}: {:?} aborted on pin {}", device.id, phase, device.pin);
                return Err(HardwareFault::during(
                    device.pin,
                    phase,
                    format!("pwm write failed ({:?})", e.kind()),
                ));
            }
            clock.sleep(hold).await;
        }

        servo.rest().map_err(|e| {
            HardwareFault::during(
                device.pin,
                Phase::Close,
                format!("rest write failed ({:?})", e.kind()),
            )
        })?;
        info!("{}: feeding cycle complete on pin {}", device.id, device.pin);
        Ok(())
    }
}
