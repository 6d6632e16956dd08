//! Log-based notification sink.
//!
//! Implements [`NotifyPort`] by writing each feeder update to the log as
//! the same JSON payload live subscribers receive.  A websocket fan-out
//! adapter would implement the same trait.

use log::{debug, info};

use crate::app::events::FeederNotification;
use crate::app::ports::{NotifyError, NotifyPort};

/// Adapter that logs every [`FeederNotification`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl NotifyPort for LogNotifier {
    async fn publish(&self, notification: &FeederNotification) -> Result<(), NotifyError> {
        let state = &notification.value;
        info!(
            "NOTIFY | {} | food={} per_feeding={} feedings={} enabled={} skip_next={}",
            state.id,
            state.est_remaining_food,
            state.est_food_per_feeding,
            state.est_remaining_feedings,
            state.enabled,
            state.skip_next,
        );
        debug!("NOTIFY | payload {}", notification.to_json());
        Ok(())
    }
}
