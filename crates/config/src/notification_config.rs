//! Activity notification preferences

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which activity notifications are sent to other participants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Master switch; when false nothing is sent
    pub enabled: bool,

    /// Notify when items are added
    pub items_added: bool,

    /// Notify when someone starts checking items off
    pub items_purchased: bool,

    /// Notify when a shopping trip is finished (also covers missing-item reports)
    pub shopping_complete: bool,

    /// Minimum gap between two throttled notifications for the same list
    pub throttle_window_secs: u64,
}

impl NotificationConfig {
    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_window_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            items_added: true,
            items_purchased: true,
            shopping_complete: true,
            throttle_window_secs: 3600,
        }
    }
}

impl ConfigSection for NotificationConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![Validator::in_range(
            self.throttle_window_secs,
            60,
            86_400,
            "notifications.throttle_window_secs",
        )])
    }

    fn merge(&mut self, other: Self) {
        self.enabled = other.enabled;
        self.items_added = other.items_added;
        self.items_purchased = other.items_purchased;
        self.shopping_complete = other.shopping_complete;
        self.throttle_window_secs = other.throttle_window_secs;
    }

    fn section_name(&self) -> &'static str {
        "notifications"
    }
}
