//! User-facing notifications for applied corrections.

use crate::{
    config::ReconConfig,
    error::ReconResult,
    ledger::CorrectiveEvent,
    store::{NotificationRow, ReconStore},
};
use chrono::Utc;

pub struct Notifier<'a> {
    store: &'a ReconStore,
    config: &'a ReconConfig,
}

impl<'a> Notifier<'a> {
    pub fn new(store: &'a ReconStore, config: &'a ReconConfig) -> Self {
        Self { store, config }
    }

    /// Emit one notification for a persisted correction. Returns false
    /// when the amount is below the configured threshold.
    ///
    /// The caller treats a returned error as log-and-continue: the
    /// ledger correction is already committed and must stand.
    pub fn notify(&self, corrective: &CorrectiveEvent) -> ReconResult<bool> {
        let amount = corrective.event.amount;
        if amount < self.config.notify_min_amount {
            log::debug!(
                "account={} correction of {amount} below notify threshold {}",
                corrective.event.user_id,
                self.config.notify_min_amount
            );
            return Ok(false);
        }

        let row = NotificationRow {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: corrective.event.user_id.clone(),
            kind: "spa_adjustment".to_string(),
            title: "SPA history updated".to_string(),
            message: format!(
                "A missing transaction record for {amount} SPA was added to your history. \
                 You can review the details in your SPA tab."
            ),
            action_url: Some(self.config.notification_action_url.clone()),
            metadata: Some(serde_json::json!({
                "retroactive_fix": true,
                "amount": amount,
                "transaction_id": corrective.event.id,
            })),
            created_at: Utc::now().to_rfc3339(),
        };
        self.store.insert_notification(&row)?;
        Ok(true)
    }
}
