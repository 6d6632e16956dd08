//! JSON-file feeder state store.
//!
//! Keeps every record in memory and rewrites the whole file after each
//! patch.  Writes go to a sibling temp file that is then renamed over
//! the live file, so a crash mid-write leaves either the old or the new
//! file, never a torn one.
//!
//! File layout: a JSON array of feeder records (camelCase fields).

use core::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{StoreError, StorePort};
use crate::state::{DeviceId, FeederPatch, FeederState};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: RefCell<BTreeMap<DeviceId, FeederState>>,
}

impl FileStore {
    /// Load `path`.  A missing file opens an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let feeders: Vec<FeederState> = serde_json::from_str(&raw).map_err(|e| {
                    StoreError::Unavailable(format!("{}: {}", path.display(), e))
                })?;
                feeders.into_iter().map(|f| (f.id.clone(), f)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("FileStore: {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(StoreError::Unavailable(format!("{}: {}", path.display(), e)));
            }
        };
        info!("FileStore: loaded {} feeder(s) from {}", records.len(), path.display());
        Ok(Self {
            path,
            records: RefCell::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a whole record and persist (provisioning path).
    pub fn upsert(&self, state: FeederState) -> Result<(), StoreError> {
        let mut records = self.records.borrow_mut();
        let previous = records.insert(state.id.clone(), state.clone());
        if let Err(e) = self.persist(&records) {
            match previous {
                Some(old) => records.insert(old.id.clone(), old),
                None => records.remove(&state.id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self, records: &BTreeMap<DeviceId, FeederState>) -> Result<(), StoreError> {
        let feeders: Vec<&FeederState> = records.values().collect();
        let json = serde_json::to_string_pretty(&feeders)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

impl StorePort for FileStore {
    async fn get(&self, id: &DeviceId) -> Result<FeederState, StoreError> {
        self.records
            .borrow()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn patch(&self, id: &DeviceId, patch: &FeederPatch) -> Result<FeederState, StoreError> {
        let mut records = self.records.borrow_mut();
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        let before = record.clone();
        patch.apply_to(record);
        let after = record.clone();

        if let Err(e) = self.persist(&records) {
            // Keep memory in step with disk.
            records.insert(id.clone(), before);
            return Err(e);
        }
        Ok(after)
    }

    async fn list(&self) -> Result<Vec<FeederState>, StoreError> {
        Ok(self.records.borrow().values().cloned().collect())
    }
}
