//! In-memory feeder state store.
//!
//! Implements [`StorePort`] over a map held in the adapter.  Nothing is
//! persisted; embedders and tests seed it directly.  Writes are applied
//! field-by-field, so disjoint patches for one device never clobber each
//! other.

use core::cell::RefCell;
use std::collections::HashMap;

use crate::app::ports::{StoreError, StorePort};
use crate::state::{DeviceId, FeederPatch, FeederState};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RefCell<HashMap<DeviceId, FeederState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `feeders`.
    pub fn with_feeders(feeders: impl IntoIterator<Item = FeederState>) -> Self {
        let store = Self::new();
        for feeder in feeders {
            store.insert(feeder);
        }
        store
    }

    /// Insert or replace a whole record (provisioning path).
    pub fn insert(&self, state: FeederState) {
        self.records.borrow_mut().insert(state.id.clone(), state);
    }

    /// Current record for `id`, bypassing the port.
    pub fn snapshot(&self, id: &DeviceId) -> Option<FeederState> {
        self.records.borrow().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl StorePort for MemoryStore {
    async fn get(&self, id: &DeviceId) -> Result<FeederState, StoreError> {
        self.snapshot(id).ok_or(StoreError::NotFound)
    }

    async fn patch(&self, id: &DeviceId, patch: &FeederPatch) -> Result<FeederState, StoreError> {
        let mut records = self.records.borrow_mut();
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<FeederState>, StoreError> {
        Ok(self.records.borrow().values().cloned().collect())
    }
}
