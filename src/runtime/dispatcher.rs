//! Queue dispatcher: poll loop plus lane tasks on one executor.
//!
//! Runs on a single thread using `edge-executor` for cooperative
//! multi-task scheduling.  One poll task and [`LANE_COUNT`] lane tasks:
//!
//! 1. **Poll**: receives from the [`QueuePort`], decodes, routes onto
//!    the device's lane; sleeps `poll_interval` when the queue is empty.
//! 2. **Lanes**: each awaits its channel, runs the [`CommandHandler`],
//!    then settles the message with the queue.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  futures_lite::future::block_on                              │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                          │  │
//!  │  │                                                        │  │
//!  │  │  ┌───────────┐   Envelope   ┌───────────┐              │  │
//!  │  │  │ Poll loop │─────────────▶│ Lane task │ × 16         │  │
//!  │  │  │ recv ⏱    │              │ handle+ack│              │  │
//!  │  │  └───────────┘              └───────────┘              │  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Acknowledgement policy
//!
//! | outcome                  | queue action                                  |
//! |--------------------------|-----------------------------------------------|
//! | success / duplicate      | ack                                           |
//! | terminal failure         | ack (logged, dropped)                         |
//! | retryable failure        | retried in place; dead-letter once exhausted  |
//! | undecodable body         | ack (logged, dropped)                         |
//!
//! A retryable failure holds its lane: the device's next command is not
//! taken until the failing one is acknowledged or dead-lettered, so a
//! later write can never be overtaken by an earlier one.  The retry
//! window must stay inside the queue's visibility timeout.

use core::cell::Cell;
use core::time::Duration;
use std::rc::Rc;

use edge_executor::LocalExecutor;
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::app::commands::{Command, CommandId};
use crate::app::ports::{ClockPort, CommandHandler, Delivery, QueueError, QueuePort};

use super::lanes::{Envelope, LANE_COUNT, Lanes};

/// Executor task capacity: one poll task plus every lane.
pub const EXECUTOR_TASKS: usize = LANE_COUNT + 4;

/// Back-off while waiting for in-flight commands to drain at shutdown.
const DRAIN_POLL: Duration = Duration::from_millis(10);

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Per-run outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Handled successfully (including duplicates) and acknowledged.
    pub applied: u32,
    /// Terminal failures, acknowledged and dropped.
    pub rejected: u32,
    /// Attempts that failed retryably (each one retried or dead-lettered).
    pub deferred: u32,
    /// Commands whose retry budget ran out, moved to the dead-letter list.
    pub dead_lettered: u32,
    /// Undecodable bodies, acknowledged and dropped.
    pub malformed: u32,
}

impl DispatchStats {
    /// Messages that reached a final outcome.
    pub fn total(&self) -> u32 {
        self.applied + self.rejected + self.dead_lettered + self.malformed
    }
}

pub struct Dispatcher<Q, W, C> {
    queue: Q,
    handler: W,
    clock: C,
    lanes: Lanes,
    poll_interval: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
    in_flight: Cell<usize>,
    stats: Cell<DispatchStats>,
}

impl<Q, W, C> Dispatcher<Q, W, C>
where
    Q: QueuePort + 'static,
    W: CommandHandler + 'static,
    C: ClockPort + 'static,
{
    pub fn new(queue: Q, handler: W, clock: C, poll_interval: Duration) -> Self {
        Self {
            queue,
            handler,
            clock,
            lanes: Lanes::new(),
            poll_interval,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            in_flight: Cell::new(0),
            stats: Cell::new(DispatchStats::default()),
        }
    }

    /// Attempts per command on retryable failures (at least one), and the
    /// pause between them.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Drive the pipeline on the current thread until the queue closes
    /// and every routed command has settled.
    pub fn run(self: Rc<Self>) -> DispatchStats {
        let executor: LocalExecutor<'static, EXECUTOR_TASKS> = LocalExecutor::new();
        self.spawn_lanes(&executor);
        info!("dispatcher started ({} lanes)", LANE_COUNT);
        future::block_on(executor.run(self.poll_loop()))
    }

    /// Spawn one detached task per lane on `executor`.
    pub fn spawn_lanes<const N: usize>(self: &Rc<Self>, executor: &LocalExecutor<'static, N>) {
        for index in 0..LANE_COUNT {
            executor.spawn(self.clone().lane_loop(index)).detach();
        }
    }

    /// Receive and route until the queue reports closed, then wait for
    /// the lanes to drain.
    pub async fn poll_loop(self: Rc<Self>) -> DispatchStats {
        loop {
            match self.queue.receive().await {
                Ok(Some(delivery)) => self.route(delivery).await,
                Ok(None) => self.idle(self.poll_interval).await,
                Err(QueueError::Closed) => break,
                Err(e) => {
                    warn!("queue receive failed: {}", e);
                    self.idle(self.poll_interval).await;
                }
            }
        }

        info!("queue closed, draining {} in-flight command(s)", self.in_flight.get());
        while self.in_flight.get() > 0 {
            self.idle(DRAIN_POLL).await;
        }

        let stats = self.stats.get();
        info!(
            "dispatcher stopped: {} applied, {} rejected, {} deferred, {} dead-lettered, {} malformed",
            stats.applied, stats.rejected, stats.deferred, stats.dead_lettered, stats.malformed
        );
        stats
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.get()
    }

    pub fn handler(&self) -> &W {
        &self.handler
    }

    // ── Internal ──────────────────────────────────────────────

    async fn lane_loop(self: Rc<Self>, index: usize) {
        let lane = self.lanes.lane(index);
        loop {
            let envelope = lane.receive().await;
            self.settle(&envelope).await;
            self.in_flight.set(self.in_flight.get().saturating_sub(1));
        }
    }

    async fn route(&self, delivery: Delivery) {
        let mut command = match Command::decode(&delivery.body) {
            Ok(command) => command,
            Err(e) => {
                error!("message {} dropped: {}", delivery.message_id, e);
                self.bump(|s| s.malformed += 1);
                self.ack(delivery.receipt).await;
                return;
            }
        };
        if command.command_id.is_none() {
            command.command_id = Some(CommandId::new(delivery.message_id.clone()));
        }
        debug!(
            "message {} (receive #{}) → {} {}",
            delivery.message_id, delivery.receive_count, command.id, command.action
        );

        self.in_flight.set(self.in_flight.get() + 1);
        self.lanes
            .send(Envelope {
                receipt: delivery.receipt,
                command,
            })
            .await;
    }

    /// Run one command to a final queue outcome.  Retryable failures are
    /// retried here, holding the lane, until the attempt budget is spent.
    async fn settle(&self, envelope: &Envelope) {
        let command = &envelope.command;
        let mut attempt = 1;
        loop {
            match self.handler.handle(command).await {
                Ok(_) => {
                    self.bump(|s| s.applied += 1);
                    self.ack(envelope.receipt).await;
                    return;
                }
                Err(e) if e.is_terminal() => {
                    self.bump(|s| s.rejected += 1);
                    self.ack(envelope.receipt).await;
                    return;
                }
                Err(e) => {
                    self.bump(|s| s.deferred += 1);
                    if attempt >= self.retry_attempts {
                        error!(
                            "{}: {} dead-lettered after {} attempt(s): {}",
                            command.id, command.action, attempt, e
                        );
                        self.bump(|s| s.dead_lettered += 1);
                        if let Err(e) = self.queue.dead_letter(envelope.receipt).await {
                            warn!("dead-letter of receipt {} failed: {}", envelope.receipt, e);
                        }
                        return;
                    }
                    debug!(
                        "{}: attempt {} failed, retrying in {:?}",
                        command.id, attempt, self.retry_backoff
                    );
                    self.clock.sleep(self.retry_backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn ack(&self, receipt: u64) {
        if let Err(e) = self.queue.ack(receipt).await {
            warn!("ack of receipt {} failed: {}", receipt, e);
        }
    }

    /// Sleep, then yield so lane tasks run even when the clock is instant.
    async fn idle(&self, duration: Duration) {
        self.clock.sleep(duration).await;
        future::yield_now().await;
    }

    fn bump(&self, update: impl FnOnce(&mut DispatchStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}
