//! Integration tests for the ActuatorSequencer against the simulated
//! PWM bench adapter.

use core::time::Duration;

use embedded_hal::pwm::SetDutyCycle;
use futures_lite::future::block_on;

use petfeeder::adapters::hardware::SimulatedHardware;
use petfeeder::app::ports::ActuatorPort;
use petfeeder::config::ServoConfig;
use petfeeder::drivers::sequencer::{ActuatorSequencer, Phase};
use petfeeder::registry::DeviceConfig;

use super::mock_ports::{InstantClock, PERIOD_US};

fn sequencer() -> ActuatorSequencer {
    ActuatorSequencer::new(ServoConfig::default())
}

#[test]
fn full_cycle_drives_four_phases_then_rests() {
    let bench = SimulatedHardware::new(PERIOD_US);
    let clock = InstantClock::default();
    let device = DeviceConfig::new("f1", 18, 500);

    block_on(sequencer().actuate(&bench, &clock, &device)).unwrap();

    assert_eq!(bench.history(18), vec![2_500, 500, 2_500, 500, 0]);
    assert_eq!(*clock.slept.borrow(), vec![Duration::from_millis(500); 4]);
    assert!(!bench.is_claimed(18), "line released after the cycle");
}

#[test]
fn pulse_widths_follow_servo_config() {
    let servo = ServoConfig {
        period_us: PERIOD_US,
        forward_pulse_us: 2_000,
        reverse_pulse_us: 1_000,
    };
    let seq = ActuatorSequencer::new(servo);
    assert_eq!(seq.pulse_for(Phase::Dispense), 2_000);
    assert_eq!(seq.pulse_for(Phase::Close), 1_000);

    let bench = SimulatedHardware::new(PERIOD_US);
    block_on(seq.actuate(&bench, &InstantClock::default(), &DeviceConfig::new("f1", 5, 100)))
        .unwrap();
    assert_eq!(bench.history(5), vec![2_000, 1_000, 2_000, 1_000, 0]);
}

#[test]
fn busy_line_is_an_acquire_fault() {
    let bench = SimulatedHardware::new(PERIOD_US);
    let mut held = bench.acquire(18).unwrap();
    held.set_duty_cycle(1_500).unwrap();
    let clock = InstantClock::default();

    let fault = block_on(sequencer().actuate(&bench, &clock, &DeviceConfig::new("f1", 18, 500)))
        .unwrap_err();

    assert_eq!(fault.pin, 18);
    assert_eq!(fault.phase, None);
    assert_eq!(bench.history(18), vec![1_500], "held line untouched");
    assert!(clock.slept.borrow().is_empty());
}

#[test]
fn devices_on_separate_pins_do_not_interfere() {
    let bench = SimulatedHardware::new(PERIOD_US);
    let clock = InstantClock::default();

    block_on(sequencer().actuate(&bench, &clock, &DeviceConfig::new("f1", 18, 100))).unwrap();
    block_on(sequencer().actuate(&bench, &clock, &DeviceConfig::new("f2", 19, 100))).unwrap();

    assert_eq!(bench.history(18).len(), 5);
    assert_eq!(bench.history(19).len(), 5);
    assert_eq!(bench.writes().len(), 10);
}
