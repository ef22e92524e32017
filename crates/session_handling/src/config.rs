//! Session handler settings and defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_enforce_reservation_expiry() -> bool {
    true
}

fn default_notification_timeout_ms() -> u64 {
    5000
}

fn default_event_channel_capacity() -> usize {
    256
}

/// Tunables for a hosted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Reject reservations whose backend-assigned deadline has passed
    #[serde(default = "default_enforce_reservation_expiry")]
    pub enforce_reservation_expiry: bool,

    /// Upper bound for a single backend notification call, in milliseconds
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,

    /// Buffer size of the session event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SessionSettings {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enforce_reservation_expiry: default_enforce_reservation_expiry(),
            notification_timeout_ms: default_notification_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}
