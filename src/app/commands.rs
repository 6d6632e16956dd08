//! Inbound commands to the command worker.
//!
//! These arrive as JSON queue message bodies, produced by ingress (user
//! app, voice assistant, scheduled trigger) and interpreted by the
//! [`CommandWorker`](super::service::CommandWorker).
//!
//! ```text
//!   { "id": "f1", "action": "update", "fields": { "interval": "0 9 * * ? *" } }
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, ValidationError};
use crate::state::{DeviceId, FeederStatus};

/// What the worker should do with the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Dispense one portion (unless a skip is pending).
    Activate,
    /// Toggle the pending-skip flag.
    Skip,
    /// Invert the enabled flag.
    ToggleEnabled,
    /// Sparse field-level write.
    Update,
    /// Device-originated confirmation of an actuation it already performed.
    PostActivation,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Activate => "activate",
            Self::Skip => "skip",
            Self::ToggleEnabled => "toggle-enabled",
            Self::Update => "update",
            Self::PostActivation => "post-activation",
        };
        f.write_str(name)
    }
}

/// Idempotency key.  Stable across redeliveries of one queue message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The patchable subset of a feeder record, as sent by ingress.
///
/// Unknown keys are a decode error.  `interval` stays a raw string so a
/// bad expression surfaces as a validation failure, not a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FeederStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_remaining_food: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_food_per_feeding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_remaining_feedings: Option<u32>,
}

impl UpdateFields {
    /// True when no field other than the (informational) `id` is present.
    pub fn is_empty(&self) -> bool {
        Self {
            id: None,
            ..self.clone()
        } == Self::default()
    }
}

/// One device instruction as carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: DeviceId,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<UpdateFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
}

impl Command {
    pub fn new(id: impl Into<DeviceId>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            fields: None,
            command_id: None,
        }
    }

    pub fn activate(id: impl Into<DeviceId>) -> Self {
        Self::new(id, Action::Activate)
    }

    pub fn update(id: impl Into<DeviceId>, fields: UpdateFields) -> Self {
        Self {
            fields: Some(fields),
            ..Self::new(id, Action::Update)
        }
    }

    #[must_use]
    pub fn with_command_id(mut self, command_id: CommandId) -> Self {
        self.command_id = Some(command_id);
        self
    }

    /// Parse a queue message body.
    pub fn decode(body: &str) -> Result<Self, CommandError> {
        let command: Self = serde_json::from_str(body)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if command.id.as_str().is_empty() {
            return Err(ValidationError::Malformed("empty device id".into()).into());
        }
        Ok(command)
    }

    pub fn encode(&self) -> String {
        // A struct of strings, enums and integers always serialises.
        serde_json::to_string(self).unwrap_or_default()
    }
}
