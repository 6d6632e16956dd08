//! Short-lived record of recently processed commands.
//!
//! The queue delivers at least once, so the same command can arrive
//! again after its effects were already persisted (an ack lost in
//! flight, a visibility window that lapsed mid-actuation).  The ledger
//! lets the worker recognise those redeliveries by [`CommandId`].
//!
//! Two stages are tracked:
//!
//! - [`Stage::Actuated`]: the servo ran but the state write did not
//!   land.  A redelivered `activate` must not dispense again; it only
//!   re-runs reconciliation.
//! - [`Stage::Applied`]: everything was persisted.  A redelivery is
//!   acknowledged without effects.
//!
//! The ledger lives in process memory only and holds the most recent
//! [`LEDGER_CAPACITY`] commands; older entries are evicted first.

use heapless::Deque;

use crate::app::commands::CommandId;

pub const LEDGER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Actuated,
    Applied,
}

#[derive(Debug, Default)]
pub struct CommandLedger {
    entries: Deque<(CommandId, Stage), LEDGER_CAPACITY>,
}

impl CommandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, id: &CommandId) -> Option<Stage> {
        self.entries
            .iter()
            .find(|(seen, _)| seen == id)
            .map(|(_, stage)| *stage)
    }

    /// Record `id` at `stage`, replacing any earlier stage for it.
    pub fn record(&mut self, id: &CommandId, stage: Stage) {
        if let Some(entry) = self.entries.iter_mut().find(|(seen, _)| seen == id) {
            entry.1 = stage;
            return;
        }
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // Room was made above.
        let _ = self.entries.push_back((id.clone(), stage));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
