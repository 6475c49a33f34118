//! Run configuration.
//!
//! Everything the components need is passed in explicitly at
//! construction time — no environment singletons, no embedded
//! credentials.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Corrections at or above this amount produce a notification.
    /// The production fix scripts used 50; 0 notifies on every correction.
    pub notify_min_amount: i64,

    /// Legacy log tables to include alongside spa_transactions.
    pub include_points_log: bool,
    pub include_bonus_activities: bool,

    /// Where the notification sends the player to review their history.
    pub notification_action_url: String,

    /// When a corrective write hits the already-corrected marker, retry
    /// this many times before reporting the account as failed.
    pub conflict_retries: u32,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            notify_min_amount: 0,
            include_points_log: true,
            include_bonus_activities: true,
            notification_action_url: "/profile?tab=spa".to_string(),
            conflict_retries: 1,
        }
    }
}

impl ReconConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg = serde_json::from_str(&raw)?;
        Ok(cfg)
    }
}
