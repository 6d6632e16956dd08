//! Device registry: which PWM line drives which feeder, and for how long.
//!
//! Single source of truth for actuator wiring.  The worker never
//! hard-codes a pin; it looks the device up here right before actuating.
//!
//! Capacity is fixed at [`MAX_DEVICES`].  One host drives a handful of
//! feeders at most, and each needs its own hardware PWM line.

use core::time::Duration;

use heapless::FnvIndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::state::DeviceId;

/// Maximum number of feeders one worker drives (power of two).
pub const MAX_DEVICES: usize = 16;

/// Hardware PWM0 on the Raspberry Pi header.
pub const DEFAULT_SERVO_PIN: u8 = 18;

/// Per-phase hold time when the config does not specify one.
pub const DEFAULT_PHASE_MS: u32 = 2_000;

/// Longest accepted phase; anything above is almost certainly a typo.
pub const MAX_PHASE_MS: u32 = 10_000;

/// Actuation wiring and timing for one feeder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub pin: u8,
    #[serde(default = "default_phase_ms")]
    pub phase_ms: u32,
}

fn default_phase_ms() -> u32 {
    DEFAULT_PHASE_MS
}

impl DeviceConfig {
    pub fn new(id: impl Into<DeviceId>, pin: u8, phase_ms: u32) -> Self {
        Self {
            id: id.into(),
            pin,
            phase_ms,
        }
    }

    pub fn phase_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.phase_ms))
    }
}

/// Immutable id → [`DeviceConfig`] map, validated at construction.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: FnvIndexMap<DeviceId, DeviceConfig, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub fn from_devices(devices: &[DeviceConfig]) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for device in devices {
            if device.phase_ms == 0 || device.phase_ms > MAX_PHASE_MS {
                return Err(ConfigError::ValidationFailed(
                    "device phaseMs must be 1-10000",
                ));
            }
            if registry.devices.contains_key(&device.id) {
                return Err(ConfigError::ValidationFailed("duplicate device id"));
            }
            if registry.devices.values().any(|d| d.pin == device.pin) {
                return Err(ConfigError::ValidationFailed(
                    "two devices share one actuator pin",
                ));
            }
            registry
                .devices
                .insert(device.id.clone(), device.clone())
                .map_err(|_| ConfigError::ValidationFailed("too many devices (max 16)"))?;
        }
        Ok(registry)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceConfig> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.values()
    }
}
