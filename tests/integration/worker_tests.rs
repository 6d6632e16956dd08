//! Integration tests for the CommandWorker state machine.
//!
//! Drive every action through `process()` against the recording fakes
//! and check the store, actuator, notification and registrar histories.

use core::time::Duration;

use futures_lite::future::block_on;

use petfeeder::app::ports::StorePort;
use petfeeder::drivers::sequencer::Phase;
use petfeeder::error::Disposition;
use petfeeder::{
    Ack, Action, Command, CommandError, CommandId, DeviceId, FeederState, Interval,
    UpdateFields, ValidationError,
};

use super::mock_ports::{TestWorker, pin_of, worker_at, worker_with};

const NOW: u64 = 1_700_000_000_000;

fn feeder(id: &str, food: u32, per_feeding: u32) -> FeederState {
    FeederState::new(id, food, per_feeding)
}

fn run(worker: &TestWorker, command: Command) -> Result<Ack, CommandError> {
    block_on(worker.process(&command))
}

fn update(id: &str, fields: UpdateFields) -> Command {
    Command::update(id, fields)
}

// ── activate ──────────────────────────────────────────────────

#[test]
fn activate_dispenses_one_portion_and_notifies() {
    let worker = worker_at(NOW, [feeder("f1", 10, 2)]);

    let ack = run(&worker, Command::activate("f1")).unwrap();

    let Ack::Actuated(state) = ack else {
        panic!("expected Actuated, got {ack:?}");
    };
    assert_eq!(state.est_remaining_food, 8);
    assert_eq!(state.est_remaining_feedings, 4);
    assert_eq!(state.last_active, NOW);
    assert_eq!(worker.store().record("f1"), state);

    assert_eq!(worker.hardware().actuations(), 1);
    assert_eq!(
        worker.hardware().duties_for(pin_of("f1")),
        vec![2_500, 500, 2_500, 500, 0]
    );
    assert_eq!(worker.clock().total_slept(), Duration::from_secs(8));

    assert_eq!(worker.notifier().count(), 1);
    let note = worker.notifier().last().unwrap();
    assert_eq!(note.subscription_type, "feederUpdate");
    assert_eq!(note.value, state);
}

#[test]
fn activate_derives_next_active_from_interval() {
    let interval = Interval::parse("0 9,21 * * ? *").unwrap();
    let mut state = feeder("f1", 10, 2);
    state.interval = Some(interval.clone());
    let worker = worker_at(NOW, [state]);

    run(&worker, Command::activate("f1")).unwrap();

    let stored = worker.store().record("f1");
    assert_eq!(stored.next_active, Some(interval.next_after(NOW)));
    assert!(stored.next_active.unwrap() > NOW);
}

#[test]
fn activate_with_no_food_is_out_of_stock_and_touches_nothing() {
    let worker = worker_with([feeder("f1", 0, 2)]);

    let err = run(&worker, Command::activate("f1")).unwrap_err();

    assert_eq!(err, CommandError::OutOfStock(DeviceId::from("f1")));
    assert!(err.is_terminal());
    assert_eq!(worker.hardware().actuations(), 0);
    assert_eq!(worker.store().write_count(), 0);
    assert_eq!(worker.notifier().count(), 0);
}

#[test]
fn activate_on_disabled_feeder_is_rejected() {
    let mut state = feeder("f1", 10, 2);
    state.enabled = false;
    let worker = worker_with([state.clone()]);

    let err = run(&worker, Command::activate("f1")).unwrap_err();

    assert_eq!(err, CommandError::Disabled(DeviceId::from("f1")));
    assert_eq!(worker.hardware().actuations(), 0);
    assert_eq!(worker.store().record("f1"), state);
}

#[test]
fn pending_skip_is_consumed_even_without_food() {
    let mut state = feeder("f1", 0, 2);
    state.skip_next = true;
    let worker = worker_with([state]);

    let ack = run(&worker, Command::activate("f1")).unwrap();

    let Ack::SkipConsumed(state) = ack else {
        panic!("expected SkipConsumed, got {ack:?}");
    };
    assert!(!state.skip_next);
    assert_eq!(state.est_remaining_food, 0);
    assert_eq!(worker.hardware().actuations(), 0);
    assert_eq!(worker.notifier().count(), 1);
}

#[test]
fn disabled_check_precedes_pending_skip() {
    let mut state = feeder("f1", 10, 2);
    state.enabled = false;
    state.skip_next = true;
    let worker = worker_with([state]);

    let err = run(&worker, Command::activate("f1")).unwrap_err();

    assert!(matches!(err, CommandError::Disabled(_)));
    assert!(worker.store().record("f1").skip_next, "skip must survive");
}

#[test]
fn record_without_actuator_entry_is_unregistered() {
    let worker = worker_with([feeder("f3", 10, 2)]);

    let err = run(&worker, Command::activate("f3")).unwrap_err();

    assert_eq!(err, CommandError::Unregistered(DeviceId::from("f3")));
    assert!(err.is_terminal());
    assert_eq!(worker.store().write_count(), 0);
}

#[test]
fn unknown_device_is_not_found() {
    let worker = worker_with([]);

    let err = run(&worker, Command::activate("ghost")).unwrap_err();

    assert_eq!(err, CommandError::NotFound(DeviceId::from("ghost")));
    assert_eq!(err.disposition(), Disposition::Terminal);
    assert_eq!(worker.hardware().actuations(), 0);
}

#[test]
fn pwm_fault_aborts_and_leaves_state_untouched() {
    let state = feeder("f1", 10, 2);
    let worker = worker_with([state.clone()]);
    worker.hardware().fail_at.set(Some(2));

    let err = run(&worker, Command::activate("f1")).unwrap_err();

    let CommandError::Hardware(fault) = &err else {
        panic!("expected Hardware, got {err:?}");
    };
    assert_eq!(fault.pin, 18);
    assert_eq!(fault.phase, Some(Phase::Redispense));
    assert!(err.is_terminal());
    // Two phases ran, then the line was forced to rest.
    assert_eq!(worker.hardware().duties_for(18), vec![2_500, 500, 0]);
    assert_eq!(worker.store().record("f1"), state);
    assert_eq!(worker.notifier().count(), 0);
}

#[test]
fn store_outage_before_actuation_is_retryable() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.store().fail_next_reads(1);

    let err = run(&worker, Command::activate("f1")).unwrap_err();

    assert!(matches!(err, CommandError::StoreUnavailable(_)));
    assert_eq!(err.disposition(), Disposition::Retry);
    assert_eq!(worker.hardware().actuations(), 0);

    // The redelivery goes through normally.
    assert!(matches!(
        run(&worker, Command::activate("f1")),
        Ok(Ack::Actuated(_))
    ));
}

// ── redelivery ────────────────────────────────────────────────

#[test]
fn redelivered_command_is_acknowledged_without_effects() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    let command = Command::activate("f1").with_command_id(CommandId::new("c1"));

    run(&worker, command.clone()).unwrap();
    let ack = run(&worker, command).unwrap();

    assert_eq!(ack, Ack::Duplicate(CommandId::new("c1")));
    assert_eq!(worker.hardware().actuations(), 1);
    assert_eq!(worker.store().record("f1").est_remaining_food, 8);
    assert_eq!(worker.notifier().count(), 1);
}

#[test]
fn retry_after_failed_write_does_not_dispense_twice() {
    let worker = worker_at(NOW, [feeder("f1", 10, 2)]);
    let command = Command::activate("f1").with_command_id(CommandId::new("c7"));
    worker.store().fail_next_writes(1);

    let err = run(&worker, command.clone()).unwrap_err();
    assert_eq!(err.disposition(), Disposition::Retry);
    assert_eq!(worker.hardware().actuations(), 1);
    assert_eq!(worker.store().record("f1").est_remaining_food, 10);

    let ack = run(&worker, command.clone()).unwrap();
    assert!(matches!(ack, Ack::Actuated(ref s) if s.est_remaining_food == 8));
    assert_eq!(worker.hardware().actuations(), 1, "feeding already happened");

    assert!(matches!(run(&worker, command), Ok(Ack::Duplicate(_))));
    assert_eq!(worker.ledger_len(), 1);
}

#[test]
fn commands_without_id_are_never_deduplicated() {
    let worker = worker_with([feeder("f1", 10, 2)]);

    run(&worker, Command::activate("f1")).unwrap();
    run(&worker, Command::activate("f1")).unwrap();

    assert_eq!(worker.hardware().actuations(), 2);
    assert_eq!(worker.store().record("f1").est_remaining_food, 6);
    assert_eq!(worker.ledger_len(), 0);
}

// ── skip / toggle-enabled ─────────────────────────────────────

#[test]
fn skip_toggles_and_never_actuates() {
    let worker = worker_with([feeder("f1", 10, 2)]);

    let first = run(&worker, Command::new("f1", Action::Skip)).unwrap();
    assert!(first.state().unwrap().skip_next);
    let second = run(&worker, Command::new("f1", Action::Skip)).unwrap();
    assert!(!second.state().unwrap().skip_next);

    assert_eq!(worker.hardware().actuations(), 0);
    assert_eq!(worker.store().record("f1").est_remaining_food, 10);
    assert_eq!(worker.notifier().count(), 2);
}

#[test]
fn toggle_enabled_inverts_flag() {
    let worker = worker_with([feeder("f1", 10, 2)]);

    let ack = run(&worker, Command::new("f1", Action::ToggleEnabled)).unwrap();
    assert!(!ack.state().unwrap().enabled);

    let err = run(&worker, Command::activate("f1")).unwrap_err();
    assert!(matches!(err, CommandError::Disabled(_)));

    run(&worker, Command::new("f1", Action::ToggleEnabled)).unwrap();
    assert!(worker.store().record("f1").enabled);
}

#[test]
fn toggles_on_unknown_device_are_not_found() {
    let worker = worker_with([]);
    for action in [Action::Skip, Action::ToggleEnabled] {
        let err = run(&worker, Command::new("ghost", action)).unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)), "{action}");
    }
}

// ── update ────────────────────────────────────────────────────

#[test]
fn update_recomputes_feedings_and_registers_new_interval() {
    let worker = worker_at(NOW, [feeder("f1", 10, 2)]);

    let ack = run(
        &worker,
        update(
            "f1",
            UpdateFields {
                est_remaining_food: Some(21),
                interval: Some("0 9,21 * * ? *".into()),
                ..UpdateFields::default()
            },
        ),
    )
    .unwrap();

    let state = ack.state().unwrap();
    assert_eq!(state.est_remaining_food, 21);
    assert_eq!(state.est_remaining_feedings, 10);
    let interval = Interval::parse("0 9,21 * * ? *").unwrap();
    assert_eq!(state.interval.as_ref(), Some(&interval));
    assert_eq!(state.next_active, Some(interval.next_after(NOW)));
    assert_eq!(
        *worker.registrar().registered.borrow(),
        vec![(DeviceId::from("f1"), "0 9,21 * * ? *".to_string())]
    );
    assert_eq!(worker.hardware().actuations(), 0);

    // Same interval again: written, not re-registered.
    run(
        &worker,
        update(
            "f1",
            UpdateFields {
                interval: Some("0 9,21 * * ? *".into()),
                ..UpdateFields::default()
            },
        ),
    )
    .unwrap();
    assert_eq!(worker.registrar().registered.borrow().len(), 1);
}

#[test]
fn update_writes_only_present_fields() {
    let worker = worker_with([feeder("f1", 10, 2)]);

    run(
        &worker,
        update(
            "f1",
            UpdateFields {
                name: Some("Kitchen".into()),
                ..UpdateFields::default()
            },
        ),
    )
    .unwrap();

    let writes = worker.store().writes.borrow();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1.field_names(), vec!["name"]);
    drop(writes);
    let stored = worker.store().record("f1");
    assert_eq!(stored.name, "Kitchen");
    assert_eq!(stored.est_remaining_food, 10);
}

#[test]
fn invalid_interval_leaves_record_unchanged() {
    let mut state = feeder("f1", 10, 2);
    state.interval = Some(Interval::parse("0 8 * * ? *").unwrap());
    let worker = worker_with([state.clone()]);

    let err = run(
        &worker,
        update(
            "f1",
            UpdateFields {
                interval: Some("99,x 25 * * ? *".into()),
                name: Some("renamed".into()),
                ..UpdateFields::default()
            },
        ),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        CommandError::Validation(ValidationError::Interval(_))
    ));
    assert!(err.is_terminal());
    assert_eq!(worker.store().write_count(), 0);
    assert_eq!(worker.store().record("f1"), state);
    assert!(worker.registrar().registered.borrow().is_empty());
}

#[test]
fn update_rejects_bad_field_sets() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    let cases = [
        (
            Command::new("f1", Action::Update),
            ValidationError::EmptyPatch,
        ),
        (
            update(
                "f1",
                UpdateFields {
                    id: Some("f1".into()),
                    ..UpdateFields::default()
                },
            ),
            ValidationError::EmptyPatch,
        ),
        (
            update(
                "f1",
                UpdateFields {
                    id: Some("f2".into()),
                    name: Some("x".into()),
                    ..UpdateFields::default()
                },
            ),
            ValidationError::IdMismatch,
        ),
        (
            update(
                "f1",
                UpdateFields {
                    est_food_per_feeding: Some(0),
                    ..UpdateFields::default()
                },
            ),
            ValidationError::ZeroFoodPerFeeding,
        ),
    ];

    for (command, expected) in cases {
        assert_eq!(
            run(&worker, command),
            Err(CommandError::Validation(expected))
        );
    }
    assert_eq!(worker.store().write_count(), 0);
}

#[test]
fn registrar_failure_does_not_fail_update() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.registrar().fail.set(true);

    let ack = run(
        &worker,
        update(
            "f1",
            UpdateFields {
                interval: Some("30 7 * * ? *".into()),
                ..UpdateFields::default()
            },
        ),
    );

    assert!(matches!(ack, Ok(Ack::Updated(_))));
    assert!(worker.store().record("f1").interval.is_some());
}

// ── post-activation ───────────────────────────────────────────

#[test]
fn post_activation_reconciles_without_hardware() {
    let worker = worker_at(NOW, [feeder("f1", 10, 2)]);

    let ack = run(&worker, Command::new("f1", Action::PostActivation)).unwrap();

    let Ack::Reconciled(state) = ack else {
        panic!("expected Reconciled, got {ack:?}");
    };
    assert_eq!(state.est_remaining_food, 8);
    assert_eq!(state.est_remaining_feedings, 4);
    assert_eq!(state.last_active, NOW);
    assert_eq!(worker.hardware().actuations(), 0);
    assert_eq!(worker.notifier().count(), 1);
}

#[test]
fn post_activation_on_empty_feeder_saturates_at_zero() {
    let worker = worker_with([feeder("f1", 1, 2)]);

    let ack = run(&worker, Command::new("f1", Action::PostActivation)).unwrap();

    let state = ack.state().unwrap();
    assert_eq!(state.est_remaining_food, 0);
    assert_eq!(state.est_remaining_feedings, 0);
}

// ── best-effort side effects ──────────────────────────────────

#[test]
fn notification_failure_does_not_fail_command() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.notifier().fail.set(true);

    let ack = run(&worker, Command::activate("f1"));

    assert!(matches!(ack, Ok(Ack::Actuated(_))));
    assert_eq!(worker.store().record("f1").est_remaining_food, 8);
}

#[test]
fn stalled_notifier_times_out_without_failing_command() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.notifier().stall.set(true);

    let ack = run(&worker, Command::activate("f1"));

    assert!(matches!(ack, Ok(Ack::Actuated(_))));
    assert_eq!(worker.store().record("f1").est_remaining_food, 8);
    assert_eq!(worker.notifier().count(), 0);
    // Four actuation phases, then the notification deadline.
    assert_eq!(worker.clock().slept.borrow().len(), 5);
    assert_eq!(worker.clock().total_slept(), Duration::from_secs(10));
}

#[test]
fn stalled_registrar_times_out_without_failing_update() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.registrar().stall.set(true);

    let ack = run(
        &worker,
        update(
            "f1",
            UpdateFields {
                interval: Some("0 9,21 * * ? *".into()),
                ..UpdateFields::default()
            },
        ),
    );

    assert!(matches!(ack, Ok(Ack::Updated(_))));
    assert_eq!(
        worker.store().record("f1").interval,
        Some(Interval::parse("0 9,21 * * ? *").unwrap())
    );
    assert!(worker.registrar().registered.borrow().is_empty());
    assert_eq!(worker.clock().total_slept(), Duration::from_secs(2));
    assert_eq!(worker.notifier().count(), 1);
}

#[test]
fn sync_schedules_registers_every_stored_interval() {
    let mut scheduled = feeder("f1", 10, 2);
    scheduled.interval = Some(Interval::parse("0 6,18 * * ? *").unwrap());
    let worker = worker_with([scheduled, feeder("f2", 10, 2)]);

    let count = block_on(worker.sync_schedules()).unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        *worker.registrar().registered.borrow(),
        vec![(DeviceId::from("f1"), "0 6,18 * * ? *".to_string())]
    );
}

#[test]
fn sync_schedules_reports_store_outage() {
    let worker = worker_with([feeder("f1", 10, 2)]);
    worker.store().fail_next_reads(1);

    let err = block_on(worker.sync_schedules()).unwrap_err();

    assert!(matches!(err, CommandError::StoreUnavailable(_)));
    // The next listing works again.
    assert_eq!(block_on(worker.store().list()).unwrap().len(), 1);
}
