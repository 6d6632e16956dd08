//! Worker configuration parameters
//!
//! All tunable parameters for the feeder command worker.  Loaded from a
//! JSON file at start-up; every field has a default so a partial file is
//! enough.

use core::fmt;
use core::time::Duration;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::registry::{DeviceConfig, DeviceRegistry};

/// Core worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    // --- Actuators ---
    /// Device registry entries (id, PWM pin, phase duration)
    pub devices: Vec<DeviceConfig>,
    /// Servo pulse geometry shared by every feeder
    pub servo: ServoConfig,

    // --- Best-effort side effects ---
    /// Upper bound on waiting for a notification push (milliseconds)
    pub notify_timeout_ms: u32,
    /// Upper bound on waiting for a scheduler registration (milliseconds)
    pub registrar_timeout_ms: u32,

    // --- Pipeline ---
    /// Back-off between queue polls when the queue is empty (milliseconds)
    pub poll_interval_ms: u32,
    /// Derive `nextActive` from `lastActive` and the interval on every write
    pub track_next_active: bool,
    /// Attempts a lane makes on a retryable failure before dead-lettering
    pub retry_attempts: u32,
    /// Pause between those attempts (milliseconds)
    pub retry_backoff_ms: u32,
    /// In-process queue behaviour
    pub queue: QueueConfig,
}

/// Servo pulse widths in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServoConfig {
    /// PWM period (20 ms = 50 Hz hobby servo)
    pub period_us: u16,
    /// Pulse that turns the auger towards the chute
    pub forward_pulse_us: u16,
    /// Pulse that backs the auger off to clear jams
    pub reverse_pulse_us: u16,
}

/// Redelivery behaviour of the in-process queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// How long a received message stays invisible before redelivery (milliseconds)
    pub visibility_timeout_ms: u32,
    /// Receives after which an unacknowledged message is dead-lettered
    pub max_receive_count: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            // Actuators
            devices: Vec::new(),
            servo: ServoConfig::default(),

            // Best-effort side effects
            notify_timeout_ms: 2_000,
            registrar_timeout_ms: 2_000,

            // Pipeline
            poll_interval_ms: 1_000,
            track_next_active: true,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            queue: QueueConfig::default(),
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            period_us: 20_000,
            forward_pulse_us: 2_500,
            reverse_pulse_us: 500,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: 30_000,
            max_receive_count: 5,
        }
    }
}

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl WorkerConfig {
    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would misdrive the servo or stall the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.servo.validate()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("pollIntervalMs must be positive"));
        }
        if self.notify_timeout_ms == 0 || self.registrar_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "side-effect timeouts must be positive",
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::ValidationFailed("retryAttempts must be positive"));
        }
        let retry_window = u64::from(self.retry_backoff_ms) * u64::from(self.retry_attempts - 1);
        if retry_window >= u64::from(self.queue.visibility_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "retry backoff must fit inside queue.visibilityTimeoutMs",
            ));
        }
        if self.queue.max_receive_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue.maxReceiveCount must be positive",
            ));
        }
        self.registry().map(|_| ())
    }

    /// Build the device registry described by `devices`.
    pub fn registry(&self) -> Result<DeviceRegistry, ConfigError> {
        DeviceRegistry::from_devices(&self.devices)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.notify_timeout_ms))
    }

    pub fn registrar_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.registrar_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(u64::from(self.retry_backoff_ms))
    }
}

impl ServoConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.period_us == 0 {
            return Err(ConfigError::ValidationFailed("servo.periodUs must be positive"));
        }
        if self.forward_pulse_us == 0 || self.reverse_pulse_us == 0 {
            return Err(ConfigError::ValidationFailed("servo pulses must be positive"));
        }
        if self.forward_pulse_us > self.period_us || self.reverse_pulse_us > self.period_us {
            return Err(ConfigError::ValidationFailed(
                "servo pulse longer than PWM period",
            ));
        }
        Ok(())
    }
}
