//! Local feeding scheduler.
//!
//! Implements the scheduler-registrar port in-process, so scheduled
//! feedings work without an external cron service.  The worker registers
//! a device's interval whenever it changes; the host loop calls
//! [`FeedingScheduler::tick`] with the wall clock and the scheduler
//! notifies a [`SchedulerDelegate`] for every device whose feeding
//! minute has arrived.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  CommandWorker ── register(id, interval) ──▶ FeedingScheduler │
//! │                                                  │            │
//! │                                   tick(now_ms)   │            │
//! │                                                  ▼            │
//! │                         SchedulerDelegate::on_feeding_due(id) │
//! │                                                  │            │
//! │                                                  ▼            │
//! │                        command queue  ◀── { action: activate } │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use core::cell::RefCell;

use log::info;

use crate::app::ports::{RegistrarError, RegistrarPort, SchedulerDelegate};
use crate::interval::Interval;
use crate::registry::MAX_DEVICES;
use crate::state::DeviceId;

const MINUTE_MS: u64 = 60_000;

// ═══════════════════════════════════════════════════════════════
//  Schedule entries
// ═══════════════════════════════════════════════════════════════

/// Internal bookkeeping for one device's schedule.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    id: DeviceId,
    interval: Interval,
    /// Epoch minute of the last fire, so one matching minute fires once
    /// no matter how often `tick` runs within it.
    last_fired_minute: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// One schedule per device, at most [`MAX_DEVICES`] of them.
#[derive(Debug)]
pub struct FeedingScheduler {
    entries: RefCell<heapless::Vec<ScheduleEntry, MAX_DEVICES>>,
}

impl Default for FeedingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedingScheduler {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(heapless::Vec::new()),
        }
    }

    /// Insert or replace the schedule for `id`.
    pub fn upsert(&self, id: &DeviceId, interval: &Interval) -> Result<(), RegistrarError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|e| &e.id == id) {
            entry.interval = interval.clone();
            entry.last_fired_minute = None;
            info!("Scheduler: {} now feeds at '{}'", id, interval);
            return Ok(());
        }
        entries
            .push(ScheduleEntry {
                id: id.clone(),
                interval: interval.clone(),
                last_fired_minute: None,
            })
            .map_err(|_| RegistrarError::Full)?;
        info!("Scheduler: added {} at '{}'", id, interval);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Fire every schedule whose interval matches the minute of `now_ms`.
    ///
    /// Safe to call more than once per minute; each matching minute fires
    /// at most once per device.
    pub fn tick(&self, now_ms: u64, delegate: &mut dyn SchedulerDelegate) {
        let minute = now_ms / MINUTE_MS;
        let mut due: heapless::Vec<DeviceId, MAX_DEVICES> = heapless::Vec::new();
        for entry in self.entries.borrow_mut().iter_mut() {
            if entry.last_fired_minute == Some(minute) || !entry.interval.matches(now_ms) {
                continue;
            }
            entry.last_fired_minute = Some(minute);
            // Capacity matches the entry table, so this cannot overflow.
            let _ = due.push(entry.id.clone());
        }

        // Borrow released before calling out.
        for id in &due {
            info!("Scheduler: {} feeding due", id);
            delegate.on_feeding_due(id);
        }
    }
}

impl RegistrarPort for FeedingScheduler {
    async fn register(&self, id: &DeviceId, interval: &Interval) -> Result<(), RegistrarError> {
        self.upsert(id, interval)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
