//! Outbound notifications.
//!
//! The [`CommandWorker`](super::service::CommandWorker) pushes these
//! through the [`NotifyPort`](super::ports::NotifyPort) after every
//! successful state write.  Adapters on the other side decide where they
//! go (log line, websocket fan-out, etc.).

use serde::Serialize;

use crate::state::FeederState;

/// Live-update payload for subscribers of a feeder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederNotification {
    pub action: &'static str,
    pub subscription_type: &'static str,
    pub value: FeederState,
}

impl FeederNotification {
    pub fn feeder_update(state: FeederState) -> Self {
        Self {
            action: "sendNotification",
            subscription_type: "feederUpdate",
            value: state,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
