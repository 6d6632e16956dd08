//! Per-device command lanes.
//!
//! Uses `embassy-sync` bounded channels to hand decoded commands from
//! the poll loop to the lane tasks.  Every device id hashes onto exactly
//! one lane, and each lane is drained by exactly one task, so commands
//! for one device are applied in enqueue order and never overlap.
//!
//! ```text
//!                       ┌─▶ lane 0  ──▶ task 0 ──▶ CommandHandler
//! ┌──────────────┐      │
//! │  Poll loop   │──────┼─▶ lane 1  ──▶ task 1 ──▶ CommandHandler
//! │ (queue recv) │      │    ...
//! └──────────────┘      └─▶ lane 15 ──▶ task 15 ──▶ CommandHandler
//! ```

use core::hash::{Hash, Hasher};
use std::hash::DefaultHasher;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::app::commands::Command;
use crate::state::DeviceId;

/// Number of lanes (and lane tasks).
pub const LANE_COUNT: usize = 16;

/// Commands buffered per lane before the poll loop is back-pressured.
pub const LANE_DEPTH: usize = 8;

/// A decoded command plus the receipt needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub receipt: u64,
    pub command: Command,
}

/// One lane: a bounded single-executor channel.
pub type Lane = Channel<NoopRawMutex, Envelope, LANE_DEPTH>;

pub struct Lanes {
    lanes: [Lane; LANE_COUNT],
}

impl Default for Lanes {
    fn default() -> Self {
        Self::new()
    }
}

impl Lanes {
    pub fn new() -> Self {
        Self {
            lanes: core::array::from_fn(|_| Channel::new()),
        }
    }

    /// Lane that owns `id`.  Stable for the life of the process.
    pub fn index_for(id: &DeviceId) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % LANE_COUNT as u64) as usize
    }

    pub fn lane(&self, index: usize) -> &Lane {
        &self.lanes[index % LANE_COUNT]
    }

    /// Queue `envelope` on its device's lane, waiting while the lane is full.
    pub async fn send(&self, envelope: Envelope) {
        let index = Self::index_for(&envelope.command.id);
        self.lane(index).send(envelope).await;
    }

    /// Commands buffered across every lane.
    pub fn pending(&self) -> usize {
        self.lanes.iter().map(|lane| lane.len()).sum()
    }
}
