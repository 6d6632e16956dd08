//! Feeder record, typed partial update, and reconciliation math.
//!
//! [`FeederState`] is the persisted record for one device.  Every write
//! to it goes through a [`FeederPatch`]: a fixed set of independently
//! optional fields that store adapters apply field-by-field.  There is no
//! way to name a field that does not exist.
//!
//! ```text
//!   FeederState ──reconcile_activation()──▶ FeederPatch ──store.patch()──▶ FeederState'
//! ```
//!
//! ## Derived fields
//!
//! `est_remaining_feedings` is always `est_remaining_food / est_food_per_feeding`
//! (integer division) after any transition that touches either food field.
//! The only exception is a raw `update` that supplies the feedings count
//! without touching either food field.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::interval::Interval;

// ───────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────

/// Stable device identifier (store key, registry key, lane key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Connectivity flag reported by the device itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeederStatus {
    #[default]
    Online,
    Offline,
}

// ───────────────────────────────────────────────────────────────
// FeederState
// ───────────────────────────────────────────────────────────────

/// One device's configuration and consumable estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederState {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FeederStatus,
    /// When false, `activate` is rejected.
    pub enabled: bool,
    /// When true, the next `activate` is consumed as a no-op.
    #[serde(default)]
    pub skip_next: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    /// Epoch milliseconds of the last genuine actuation.
    #[serde(default)]
    pub last_active: u64,
    /// Epoch milliseconds of the next scheduled feeding (derived).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_active: Option<u64>,
    pub est_remaining_food: u32,
    pub est_food_per_feeding: u32,
    #[serde(default)]
    pub est_remaining_feedings: u32,
}

impl FeederState {
    /// A freshly provisioned, enabled feeder with a consistent feedings count.
    pub fn new(id: impl Into<DeviceId>, food: u32, per_feeding: u32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            status: FeederStatus::Online,
            enabled: true,
            skip_next: false,
            interval: None,
            last_active: 0,
            next_active: None,
            est_remaining_food: food,
            est_food_per_feeding: per_feeding,
            est_remaining_feedings: remaining_feedings(food, per_feeding),
        }
    }

    /// Whether the feedings count agrees with the food fields.
    pub fn is_consistent(&self) -> bool {
        self.est_remaining_feedings
            == remaining_feedings(self.est_remaining_food, self.est_food_per_feeding)
    }
}

// ───────────────────────────────────────────────────────────────
// FeederPatch
// ───────────────────────────────────────────────────────────────

/// Sparse field-level write.  `None` means "leave untouched".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FeederStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_next: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_active: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_remaining_food: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_food_per_feeding: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_remaining_feedings: Option<u32>,
}

impl FeederPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every present field to `state`, leaving the rest untouched.
    pub fn apply_to(&self, state: &mut FeederState) {
        if let Some(name) = &self.name {
            state.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            state.description.clone_from(description);
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(enabled) = self.enabled {
            state.enabled = enabled;
        }
        if let Some(skip_next) = self.skip_next {
            state.skip_next = skip_next;
        }
        if let Some(interval) = &self.interval {
            state.interval = Some(interval.clone());
        }
        if let Some(last_active) = self.last_active {
            state.last_active = last_active;
        }
        if let Some(next_active) = self.next_active {
            state.next_active = Some(next_active);
        }
        if let Some(food) = self.est_remaining_food {
            state.est_remaining_food = food;
        }
        if let Some(per_feeding) = self.est_food_per_feeding {
            state.est_food_per_feeding = per_feeding;
        }
        if let Some(feedings) = self.est_remaining_feedings {
            state.est_remaining_feedings = feedings;
        }
    }

    /// Names of the fields this patch writes, in record order (for logs).
    pub fn field_names(&self) -> Vec<&'static str> {
        let present = [
            ("name", self.name.is_some()),
            ("description", self.description.is_some()),
            ("status", self.status.is_some()),
            ("enabled", self.enabled.is_some()),
            ("skipNext", self.skip_next.is_some()),
            ("interval", self.interval.is_some()),
            ("lastActive", self.last_active.is_some()),
            ("nextActive", self.next_active.is_some()),
            ("estRemainingFood", self.est_remaining_food.is_some()),
            ("estFoodPerFeeding", self.est_food_per_feeding.is_some()),
            ("estRemainingFeedings", self.est_remaining_feedings.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

// ───────────────────────────────────────────────────────────────
// Reconciliation
// ───────────────────────────────────────────────────────────────

/// `floor(food / per_feeding)`; a zero per-feeding amount yields zero.
pub fn remaining_feedings(food: u32, per_feeding: u32) -> u32 {
    food.checked_div(per_feeding).unwrap_or(0)
}

/// Patch for one genuine actuation observed at `now_ms`.
///
/// Subtracts one portion (saturating at zero), recomputes the feedings
/// count, stamps `last_active`, and, when `track_next_active` is set and
/// the device has an interval, derives `next_active` from it. Otherwise a
/// stored `next_active` older than `now_ms` is raised to `now_ms`, so it
/// never trails `last_active`.
pub fn reconcile_activation(state: &FeederState, now_ms: u64, track_next_active: bool) -> FeederPatch {
    let food = state
        .est_remaining_food
        .saturating_sub(state.est_food_per_feeding);
    let next_active = match (&state.interval, track_next_active) {
        (Some(interval), true) => Some(interval.next_after(now_ms)),
        _ => state.next_active.filter(|next| *next < now_ms).map(|_| now_ms),
    };

    FeederPatch {
        last_active: Some(now_ms),
        next_active,
        est_remaining_food: Some(food),
        est_remaining_feedings: Some(remaining_feedings(food, state.est_food_per_feeding)),
        ..FeederPatch::default()
    }
}
