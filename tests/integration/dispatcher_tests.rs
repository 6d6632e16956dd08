//! Integration tests for the queue → lanes → worker pipeline.
//!
//! Each test fills a `MemoryQueue`, closes it, and runs the dispatcher
//! to completion on the current thread.

use core::time::Duration;
use std::rc::Rc;
use std::sync::Arc;

use petfeeder::adapters::memory_queue::MemoryQueue;
use petfeeder::app::ports::ClockPort;
use petfeeder::config::QueueConfig;
use petfeeder::runtime::dispatcher::{DispatchStats, Dispatcher};
use petfeeder::{Action, Command, FeederState, UpdateFields};

use super::mock_ports::{TestWorker, worker_with};

/// Dispatcher clock: idles return at once without recording anything.
struct NoWait;

impl ClockPort for NoWait {
    fn now_ms(&self) -> u64 {
        0
    }

    async fn sleep(&self, _duration: Duration) {}
}

type TestDispatcher = Dispatcher<Arc<MemoryQueue>, TestWorker, NoWait>;

fn queue(visibility_timeout_ms: u32, max_receive_count: u32) -> Arc<MemoryQueue> {
    Arc::new(MemoryQueue::new(QueueConfig {
        visibility_timeout_ms,
        max_receive_count,
    }))
}

fn send(queue: &MemoryQueue, command: &Command) {
    queue.send(command.encode()).unwrap();
}

fn dispatcher(queue: &Arc<MemoryQueue>, worker: TestWorker) -> TestDispatcher {
    Dispatcher::new(queue.clone(), worker, NoWait, Duration::from_millis(1))
}

/// Close `queue` and run the pipeline until it drains.
fn run_closed(
    queue: &Arc<MemoryQueue>,
    dispatcher: TestDispatcher,
) -> (DispatchStats, Rc<TestDispatcher>) {
    queue.close();
    let dispatcher = Rc::new(dispatcher);
    let stats = dispatcher.clone().run();
    (stats, dispatcher)
}

fn drain(queue: &Arc<MemoryQueue>, worker: TestWorker) -> (DispatchStats, Rc<TestDispatcher>) {
    run_closed(queue, dispatcher(queue, worker))
}

fn food_updates(food: u32) -> Command {
    Command::update(
        "f1",
        UpdateFields {
            est_remaining_food: Some(food),
            ..UpdateFields::default()
        },
    )
}

fn notified_food(dispatcher: &TestDispatcher, id: &str) -> Vec<u32> {
    dispatcher
        .handler()
        .notifier()
        .sent
        .borrow()
        .iter()
        .filter(|n| n.value.id.as_str() == id)
        .map(|n| n.value.est_remaining_food)
        .collect()
}

#[test]
fn outcomes_are_acknowledged_per_policy() {
    let q = queue(30_000, 5);
    send(&q, &Command::activate("f1"));
    send(&q, &Command::activate("ghost"));
    q.send("{\"id\": \"f1\", \"action\": \"explode\"}").unwrap();
    q.send("not json").unwrap();
    send(&q, &Command::new("f2", Action::Skip));

    let (stats, dispatcher) = drain(
        &q,
        worker_with([FeederState::new("f1", 10, 2), FeederState::new("f2", 4, 2)]),
    );

    assert_eq!(
        stats,
        DispatchStats {
            applied: 2,
            rejected: 1,
            deferred: 0,
            dead_lettered: 0,
            malformed: 2,
        }
    );
    assert_eq!(dispatcher.stats(), stats);
    assert_eq!(q.ready_len(), 0);
    assert_eq!(q.in_flight_len(), 0);
    assert!(q.dead_letters().is_empty());

    let store = dispatcher.handler().store();
    assert_eq!(store.record("f1").est_remaining_food, 8);
    assert!(store.record("f2").skip_next);
}

#[test]
fn commands_for_one_device_apply_in_enqueue_order() {
    let q = queue(30_000, 5);
    send(&q, &food_updates(6));
    for _ in 0..4 {
        send(&q, &Command::activate("f1"));
        send(&q, &Command::new("f2", Action::ToggleEnabled));
    }

    let (stats, dispatcher) = drain(
        &q,
        worker_with([FeederState::new("f1", 20, 2), FeederState::new("f2", 4, 2)]),
    );

    // 6 → 4 → 2 → 0, then out of stock.
    assert_eq!(stats.applied, 1 + 3 + 4);
    assert_eq!(stats.rejected, 1);
    assert_eq!(notified_food(&dispatcher, "f1"), vec![6, 4, 2, 0]);
    let worker = dispatcher.handler();
    assert_eq!(worker.hardware().actuations(), 3);
    assert!(worker.store().record("f2").enabled, "four toggles");
}

#[test]
fn distinct_messages_with_identical_bodies_each_apply() {
    let q = queue(30_000, 5);
    send(&q, &Command::activate("f1"));
    send(&q, &Command::activate("f1"));

    let (stats, dispatcher) = drain(&q, worker_with([FeederState::new("f1", 10, 2)]));

    assert_eq!(stats.applied, 2);
    assert_eq!(dispatcher.handler().hardware().actuations(), 2);
}

#[test]
fn retryable_failure_is_retried_without_second_feeding() {
    let q = queue(30_000, 5);
    send(&q, &Command::activate("f1"));
    let worker = worker_with([FeederState::new("f1", 10, 2)]);
    // The post-actuation write fails once.
    worker.store().fail_next_writes(1);

    let (stats, dispatcher) = drain(&q, worker);

    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.applied, 1);
    let worker = dispatcher.handler();
    assert_eq!(worker.hardware().actuations(), 1);
    assert_eq!(worker.store().record("f1").est_remaining_food, 8);
    assert!(q.dead_letters().is_empty());
}

#[test]
fn deferred_write_is_not_overtaken_by_later_command() {
    let q = queue(30, 5);
    send(&q, &food_updates(6));
    send(&q, &food_updates(2));
    let worker = worker_with([FeederState::new("f1", 10, 2)]);
    worker.store().fail_next_writes(1);

    let (stats, dispatcher) = drain(&q, worker);

    assert_eq!(stats.applied, 2);
    assert_eq!(stats.deferred, 1);
    assert_eq!(dispatcher.handler().store().record("f1").est_remaining_food, 2);
    assert_eq!(notified_food(&dispatcher, "f1"), vec![6, 2]);
}

#[test]
fn exhausted_command_is_dead_lettered_before_next_runs() {
    let q = queue(30_000, 5);
    let activate = Command::activate("f1");
    send(&q, &activate);
    send(&q, &Command::new("f1", Action::Skip));
    let worker = worker_with([FeederState::new("f1", 10, 2)]);
    worker.store().fail_next_reads(2);

    let (stats, dispatcher) =
        run_closed(&q, dispatcher(&q, worker).with_retry(2, Duration::ZERO));

    assert_eq!(stats.deferred, 2);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.applied, 1);
    assert_eq!(q.dead_letters(), vec![activate.encode()]);
    let worker = dispatcher.handler();
    assert_eq!(worker.hardware().actuations(), 0);
    assert!(worker.store().record("f1").skip_next);
}

#[test]
fn empty_closed_queue_stops_immediately() {
    let q = queue(30_000, 5);

    let (stats, _) = drain(&q, worker_with([]));

    assert_eq!(stats.total(), 0);
}
