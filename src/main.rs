//! PetFeeder host runner.
//!
//! Reads command JSON lines from stdin into an in-process queue and runs
//! the full pipeline against a JSON state file and simulated PWM lines.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  stdin thread ──send──▶ MemoryQueue ◀──send── QueueingDelegate │
//! │                             │                    ▲             │
//! │                        Dispatcher                │ (--schedule)│
//! │                    ┌────────┴────────┐    FeedingScheduler     │
//! │                    ▼                 ▼           ▲             │
//! │               lane tasks ──▶ CommandWorker ──────┘ register    │
//! │                               │      │                         │
//! │                        FileStore   SimulatedHardware           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! echo '{"id":"kitchen","action":"activate"}' | petfeeder --config feeder.json --state feeders.json
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use edge_executor::LocalExecutor;
use futures_lite::future::block_on;
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use petfeeder::adapters::file_store::FileStore;
use petfeeder::adapters::hardware::SimulatedHardware;
use petfeeder::adapters::log_sink::LogNotifier;
use petfeeder::adapters::memory_queue::MemoryQueue;
use petfeeder::adapters::time::SystemClock;
use petfeeder::app::ports::{ClockPort, SchedulerDelegate};
use petfeeder::runtime::dispatcher::{Dispatcher, EXECUTOR_TASKS};
use petfeeder::scheduler::FeedingScheduler;
use petfeeder::{Command, CommandWorker, DeviceId, WorkerConfig};

/// How often the local scheduler checks for due feedings.
const SCHEDULE_TICK: Duration = Duration::from_secs(10);

/// Pet feeder command worker
///
/// Applies feeder commands (one JSON object per stdin line) to the state
/// file, driving simulated servos for every accepted activation.
#[derive(Parser, Debug)]
#[command(name = "petfeeder")]
#[command(version, about, long_about = None)]
struct Args {
    /// Worker config (JSON); defaults are used when omitted
    #[arg(short = 'c', long, env = "PETFEEDER_CONFIG")]
    config: Option<PathBuf>,

    /// Feeder state file (JSON array of feeder records)
    #[arg(short = 's', long, env = "PETFEEDER_STATE", default_value = "feeders.json")]
    state: PathBuf,

    /// Run the local feeding scheduler and keep running after stdin closes
    #[arg(long)]
    schedule: bool,

    /// Do not log feeder update notifications
    #[arg(long)]
    no_notify: bool,
}

// ── Scheduler delegate ────────────────────────────────────────
//
// Bridges the scheduler (which knows nothing about the queue) to the
// command queue: a due feeding becomes an ordinary `activate` command.

struct QueueingDelegate {
    queue: Arc<MemoryQueue>,
}

impl SchedulerDelegate for QueueingDelegate {
    fn on_feeding_due(&mut self, id: &DeviceId) {
        match self.queue.send(Command::activate(id.clone()).encode()) {
            Ok(message_id) => info!("{}: scheduled feeding queued as {}", id, message_id),
            Err(e) => warn!("{}: scheduled feeding not queued: {}", id, e),
        }
    }
}

async fn schedule_loop(scheduler: Rc<FeedingScheduler>, mut delegate: QueueingDelegate) {
    let clock = SystemClock::new();
    loop {
        scheduler.tick(clock.now_ms(), &mut delegate);
        clock.sleep(SCHEDULE_TICK).await;
    }
}

// ── stdin producer ────────────────────────────────────────────

fn spawn_stdin_reader(queue: Arc<MemoryQueue>, close_at_eof: bool) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            };
            let body = line.trim();
            if body.is_empty() {
                continue;
            }
            if let Err(e) = queue.send(body) {
                warn!("command not queued: {}", e);
                break;
            }
        }
        if close_at_eof {
            info!("stdin closed, no further commands");
            queue.close();
        }
    })
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("PetFeeder v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Config ─────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => WorkerConfig::load(path)?,
        None => {
            warn!("no config given, running with defaults (no devices registered)");
            WorkerConfig::default()
        }
    };

    // ── 2. Adapters ───────────────────────────────────────────
    let store = FileStore::open(&args.state)
        .with_context(|| format!("opening state file {}", args.state.display()))?;
    let hardware = SimulatedHardware::new(config.servo.period_us);
    let notifier = (!args.no_notify).then(LogNotifier::new);
    let scheduler = Rc::new(FeedingScheduler::new());
    let queue = Arc::new(MemoryQueue::new(config.queue));

    // ── 3. Worker ─────────────────────────────────────────────
    let worker = CommandWorker::new(
        store,
        hardware,
        SystemClock::new(),
        notifier,
        scheduler.clone(),
        &config,
    )?;
    info!("{} device(s) registered", worker.registry().len());

    if args.schedule {
        block_on(worker.sync_schedules()).context("registering stored schedules")?;
    }

    // ── 4. Producers ──────────────────────────────────────────
    let reader = spawn_stdin_reader(queue.clone(), !args.schedule);

    // ── 5. Dispatch ───────────────────────────────────────────
    let dispatcher = Rc::new(Dispatcher::new(
        queue.clone(),
        worker,
        SystemClock::new(),
        config.poll_interval(),
    )
    .with_retry(config.retry_attempts, config.retry_backoff()));
    let executor: LocalExecutor<'static, EXECUTOR_TASKS> = LocalExecutor::new();
    dispatcher.spawn_lanes(&executor);
    if args.schedule {
        info!(
            "local scheduler running {} schedule(s) (every {:?})",
            scheduler.len(),
            SCHEDULE_TICK
        );
        executor
            .spawn(schedule_loop(scheduler, QueueingDelegate { queue: queue.clone() }))
            .detach();
    }

    let stats = block_on(executor.run(dispatcher.poll_loop()));

    if reader.join().is_err() {
        warn!("stdin reader panicked");
    }
    for body in queue.dead_letters() {
        warn!("dead letter: {}", body);
    }
    info!(
        "done: {} applied, {} rejected, {} dead-lettered, {} malformed",
        stats.applied, stats.rejected, stats.dead_lettered, stats.malformed
    );
    Ok(())
}
